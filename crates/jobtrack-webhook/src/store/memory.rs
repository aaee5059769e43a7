//! In-memory record store.
//!
//! Keeps pods in a `DashMap` keyed by namespace/name and enforces optimistic
//! concurrency with a per-record version. Used for local development (seeded
//! from config) and by tests.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use jobtrack_core::{PodKey, PodRecord, Selector};

use super::{RecordStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    pods: DashMap<PodKey, PodRecord>,
    next_version: AtomicU64,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint_version(&self) -> String {
        (self.next_version.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    /// Insert or replace a pod unconditionally, assigning a fresh version.
    pub fn insert(&self, mut record: PodRecord) -> PodRecord {
        record.resource_version = self.mint_version();
        self.pods.insert(record.key(), record.clone());
        record
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<PodRecord> {
        self.pods
            .get(&PodKey::new(namespace, name))
            .map(|r| r.value().clone())
    }

    pub fn remove(&self, namespace: &str, name: &str) -> Option<PodRecord> {
        self.pods
            .remove(&PodKey::new(namespace, name))
            .map(|(_, r)| r)
    }

    /// Simulate a foreign writer touching the pod without changing its labels.
    /// Any snapshot read before this call will fail its conditional update.
    pub fn bump_version(&self, namespace: &str, name: &str) -> bool {
        match self.pods.get_mut(&PodKey::new(namespace, name)) {
            Some(mut r) => {
                r.resource_version = self.mint_version();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_one(
        &self,
        namespace: &str,
        name: &str,
        selector: &Selector,
    ) -> Result<Option<PodRecord>, StoreError> {
        Ok(self
            .pods
            .get(&PodKey::new(namespace, name))
            .filter(|r| selector.matches(&r.labels))
            .map(|r| r.value().clone()))
    }

    async fn conditional_update(&self, mut record: PodRecord) -> Result<PodRecord, StoreError> {
        match self.pods.entry(record.key()) {
            Entry::Vacant(_) => Err(StoreError::NotFound),
            Entry::Occupied(mut slot) => {
                if slot.get().resource_version != record.resource_version {
                    return Err(StoreError::Conflict);
                }
                record.resource_version = self.mint_version();
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stale_write_is_rejected_and_leaves_record_untouched() {
        let store = InMemoryRecordStore::new();
        store.insert(PodRecord::new("default", "job-1").with_label("active-jobs", "3"));

        let mut a = store
            .find_one("default", "job-1", &Selector::everything())
            .await
            .unwrap()
            .unwrap();
        let mut b = a.clone();

        a.labels.insert("active-jobs".into(), "4".into());
        store.conditional_update(a).await.unwrap();

        b.labels.insert("active-jobs".into(), "99".into());
        let err = store.conditional_update(b).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        let now = store.get("default", "job-1").unwrap();
        assert_eq!(now.label("active-jobs"), Some("4"));
    }

    #[tokio::test]
    async fn selector_hides_non_matching_pods() {
        let store = InMemoryRecordStore::new();
        store.insert(PodRecord::new("default", "job-1").with_label("app", "api"));
        let sel = Selector::parse("app=worker").unwrap();

        assert!(store.find_one("default", "job-1", &sel).await.unwrap().is_none());
        assert!(store
            .find_one("default", "job-1", &Selector::everything())
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_one("other", "job-1", &Selector::everything())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn update_of_deleted_pod_is_not_found() {
        let store = InMemoryRecordStore::new();
        let rec = store.insert(PodRecord::new("default", "job-1"));
        store.remove("default", "job-1");
        assert!(matches!(
            store.conditional_update(rec).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn bump_version_invalidates_snapshots() {
        let store = InMemoryRecordStore::new();
        let rec = store.insert(PodRecord::new("default", "job-1"));
        assert!(store.bump_version("default", "job-1"));
        assert!(!store.bump_version("default", "missing"));
        assert!(matches!(
            store.conditional_update(rec).await,
            Err(StoreError::Conflict)
        ));
    }
}
