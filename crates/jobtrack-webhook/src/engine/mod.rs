//! Counter update engine.
//!
//! Applies a [`Delta`] to a pod's counter label with optimistic concurrency:
//! fetch, parse, compute, mutate the snapshot, conditional write. A version
//! conflict on the write restarts the whole cycle from a fresh fetch after a
//! backoff delay; every other failure ends the call. Nothing read in one
//! attempt is reused in the next.
//!
//! The engine holds no locks and no per-pod state. Coordination between
//! concurrent requests happens entirely in the store's version check.

pub mod backoff;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use jobtrack_core::counter::{read_counter, write_counter};
use jobtrack_core::error::{JobTrackError, Result};
use jobtrack_core::{CounterPolicy, Delta, Selector};

use crate::config::WebhookConfig;
use crate::store::{RecordStore, StoreError};

pub use backoff::RetryPolicy;

/// Immutable engine settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub namespace: String,
    pub selector: Selector,
    pub policy: CounterPolicy,
    pub retry: RetryPolicy,
    /// Budget for all store round-trips of a single `apply` call.
    pub store_timeout: Duration,
}

impl EngineConfig {
    pub fn from_config(cfg: &WebhookConfig) -> Result<Self> {
        Ok(Self {
            namespace: cfg.target.namespace.clone(),
            selector: cfg.target.selector()?,
            policy: cfg.counter.policy(),
            retry: RetryPolicy::from(&cfg.retry),
            store_timeout: Duration::from_millis(cfg.webhook.request_timeout_ms),
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: "default".into(),
            selector: Selector::everything(),
            policy: CounterPolicy::default(),
            retry: RetryPolicy::default(),
            store_timeout: Duration::from_secs(15),
        }
    }
}

/// Result of a successful update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub value: i64,
    /// Number of read-compute-write cycles it took (>= 1).
    pub attempts: u32,
}

pub struct CounterEngine {
    cfg: EngineConfig,
    store: Arc<dyn RecordStore>,
}

impl CounterEngine {
    pub fn new(cfg: EngineConfig, store: Arc<dyn RecordStore>) -> Self {
        Self { cfg, store }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Apply `delta` to the counter of pod `name` and return the new value.
    pub async fn apply(&self, name: &str, delta: Delta, cancel: &CancellationToken) -> Result<i64> {
        self.apply_detailed(name, delta, cancel).await.map(|a| a.value)
    }

    /// Like [`apply`](Self::apply), also reporting how many attempts it took.
    pub async fn apply_detailed(
        &self,
        name: &str,
        delta: Delta,
        cancel: &CancellationToken,
    ) -> Result<Applied> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(JobTrackError::Canceled),
            res = tokio::time::timeout(self.cfg.store_timeout, self.retry_loop(name, delta)) => {
                res.map_err(|_| JobTrackError::Timeout).and_then(|r| r)
            }
        }
    }

    async fn retry_loop(&self, name: &str, delta: Delta) -> Result<Applied> {
        let max_attempts = self.cfg.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(name, delta).await {
                Ok(value) => {
                    return Ok(Applied {
                        value,
                        attempts: attempt,
                    })
                }
                Err(e) if e.is_conflict() => {
                    if attempt >= max_attempts {
                        tracing::warn!(
                            pod = %name,
                            op = delta.as_str(),
                            attempts = attempt,
                            "giving up after repeated write conflicts"
                        );
                        return Err(JobTrackError::ConflictRetriesExhausted { attempts: attempt });
                    }
                    let wait = self.cfg.retry.delay(attempt);
                    tracing::debug!(
                        pod = %name,
                        op = delta.as_str(),
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "write conflict, retrying"
                    );
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    } else {
                        tokio::task::yield_now().await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One read-compute-write cycle against fresh state.
    async fn attempt(&self, name: &str, delta: Delta) -> Result<i64> {
        let ns = &self.cfg.namespace;

        let mut pod = self
            .store
            .find_one(ns, name, &self.cfg.selector)
            .await
            .map_err(|e| JobTrackError::StoreUnavailable(format!("failed to list pods: {e}")))?
            .ok_or_else(|| JobTrackError::NotFound {
                namespace: ns.clone(),
                name: name.to_string(),
            })?;

        let current = read_counter(&pod.labels, &self.cfg.policy)?;
        let next = delta.apply(current, &self.cfg.policy)?;
        write_counter(&mut pod.labels, next, &self.cfg.policy);

        match self.store.conditional_update(pod).await {
            Ok(_) => {
                tracing::debug!(
                    pod = %name,
                    op = delta.as_str(),
                    from = current,
                    to = next,
                    "counter updated"
                );
                Ok(next)
            }
            Err(StoreError::Conflict) => Err(JobTrackError::WriteConflict(format!(
                "pod {ns}/{name} changed since it was read"
            ))),
            Err(StoreError::NotFound) => Err(JobTrackError::NotFound {
                namespace: ns.clone(),
                name: name.to_string(),
            }),
            Err(StoreError::Unavailable(msg)) => Err(JobTrackError::WriteFailed(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use jobtrack_core::PodRecord;

    use super::*;
    use crate::store::InMemoryRecordStore;

    /// Forces a foreign write between fetch and write for the next `remaining` updates.
    struct Interfering {
        inner: Arc<InMemoryRecordStore>,
        remaining: AtomicU32,
        fetches: AtomicU32,
    }

    #[async_trait]
    impl RecordStore for Interfering {
        async fn find_one(
            &self,
            namespace: &str,
            name: &str,
            selector: &Selector,
        ) -> std::result::Result<Option<PodRecord>, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.find_one(namespace, name, selector).await
        }

        async fn conditional_update(
            &self,
            record: PodRecord,
        ) -> std::result::Result<PodRecord, StoreError> {
            let hit = self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if hit {
                // another writer bumps the counter behind our back
                let mut other = self.inner.get(&record.namespace, &record.name).unwrap();
                let v: i64 = other.label("active-jobs").unwrap_or("0").parse().unwrap();
                other.labels.insert("active-jobs".into(), (v + 10).to_string());
                self.inner.conditional_update(other).await.unwrap();
            }
            self.inner.conditional_update(record).await
        }
    }

    /// Deletes the pod between the read and the write.
    struct Vanishing {
        inner: Arc<InMemoryRecordStore>,
        fetches: AtomicU32,
    }

    #[async_trait]
    impl RecordStore for Vanishing {
        async fn find_one(
            &self,
            namespace: &str,
            name: &str,
            selector: &Selector,
        ) -> std::result::Result<Option<PodRecord>, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.find_one(namespace, name, selector).await
        }

        async fn conditional_update(
            &self,
            record: PodRecord,
        ) -> std::result::Result<PodRecord, StoreError> {
            self.inner.remove(&record.namespace, &record.name);
            self.inner.conditional_update(record).await
        }
    }

    struct Broken;

    #[async_trait]
    impl RecordStore for Broken {
        async fn find_one(
            &self,
            _: &str,
            _: &str,
            _: &Selector,
        ) -> std::result::Result<Option<PodRecord>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn conditional_update(
            &self,
            _: PodRecord,
        ) -> std::result::Result<PodRecord, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn seeded(labels: &[(&str, &str)]) -> Arc<InMemoryRecordStore> {
        let store = Arc::new(InMemoryRecordStore::new());
        let mut pod = PodRecord::new("default", "job-1");
        for (k, v) in labels {
            pod = pod.with_label(*k, *v);
        }
        store.insert(pod);
        store
    }

    fn engine(store: Arc<dyn RecordStore>, cfg: EngineConfig) -> CounterEngine {
        CounterEngine::new(cfg, store)
    }

    fn fast() -> EngineConfig {
        EngineConfig {
            retry: RetryPolicy::immediate(8),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn conflict_recomputes_from_fresh_state() {
        let inner = seeded(&[("active-jobs", "1")]);
        let store = Arc::new(Interfering {
            inner: inner.clone(),
            remaining: AtomicU32::new(2),
            fetches: AtomicU32::new(0),
        });
        let eng = engine(store.clone(), fast());

        let applied = eng
            .apply_detailed("job-1", Delta::Increment, &CancellationToken::new())
            .await
            .unwrap();

        // 1 + 10 + 10 from the interfering writer, then our +1
        assert_eq!(applied.value, 22);
        assert_eq!(applied.attempts, 3);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(inner.get("default", "job-1").unwrap().label("active-jobs"), Some("22"));
    }

    #[tokio::test]
    async fn exhausted_conflicts_surface() {
        let inner = seeded(&[]);
        let store = Arc::new(Interfering {
            inner: inner.clone(),
            remaining: AtomicU32::new(100),
            fetches: AtomicU32::new(0),
        });
        let eng = engine(store, fast());

        let err = eng
            .apply("job-1", Delta::Increment, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobTrackError::ConflictRetriesExhausted { attempts: 8 }));
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let inner = Arc::new(InMemoryRecordStore::new());
        let store = Arc::new(Interfering {
            inner,
            remaining: AtomicU32::new(0),
            fetches: AtomicU32::new(0),
        });
        let eng = engine(store.clone(), fast());

        let err = eng
            .apply("ghost", Delta::Increment, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobTrackError::NotFound { .. }));
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pod_deleted_before_write_is_not_found() {
        let inner = seeded(&[("active-jobs", "1")]);
        let store = Arc::new(Vanishing {
            inner: inner.clone(),
            fetches: AtomicU32::new(0),
        });
        let eng = engine(store.clone(), fast());

        let err = eng
            .apply("job-1", Delta::Increment, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobTrackError::NotFound { ref namespace, ref name }
                if namespace == "default" && name == "job-1"
        ));
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
        assert!(inner.get("default", "job-1").is_none());
    }

    #[tokio::test]
    async fn corrupt_value_is_fatal_and_untouched() {
        let inner = seeded(&[("active-jobs", "abc")]);
        let eng = engine(inner.clone(), fast());

        let err = eng
            .apply("job-1", Delta::Decrement, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobTrackError::CorruptCounterValue { .. }));
        assert_eq!(inner.get("default", "job-1").unwrap().label("active-jobs"), Some("abc"));
    }

    #[tokio::test]
    async fn store_errors_map_to_unavailable() {
        let eng = engine(Arc::new(Broken), fast());
        let err = eng
            .apply("job-1", Delta::Increment, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobTrackError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn selector_excludes_like_missing() {
        let inner = seeded(&[("app", "api")]);
        let cfg = EngineConfig {
            selector: Selector::parse("app=worker").unwrap(),
            ..fast()
        };
        let eng = engine(inner, cfg);
        let err = eng
            .apply("job-1", Delta::Increment, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobTrackError::NotFound { .. }));
    }

    #[tokio::test]
    async fn decrement_at_zero_keeps_label_policy() {
        let inner = seeded(&[]);
        let eng = engine(inner.clone(), fast());
        let v = eng
            .apply("job-1", Delta::Decrement, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(v, 0);
        assert_eq!(inner.get("default", "job-1").unwrap().label("active-jobs"), None);

        let keep = EngineConfig {
            policy: CounterPolicy {
                remove_at_zero: false,
                ..CounterPolicy::default()
            },
            ..fast()
        };
        let eng = engine(inner.clone(), keep);
        let v = eng
            .apply("job-1", Delta::Decrement, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(v, 0);
        assert_eq!(inner.get("default", "job-1").unwrap().label("active-jobs"), Some("0"));
    }

    #[tokio::test]
    async fn canceled_token_aborts() {
        let inner = seeded(&[]);
        let eng = engine(inner.clone(), fast());
        let token = CancellationToken::new();
        token.cancel();
        let err = eng.apply("job-1", Delta::Increment, &token).await.unwrap_err();
        assert!(matches!(err, JobTrackError::Canceled));
        assert_eq!(inner.get("default", "job-1").unwrap().label("active-jobs"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_retries_hit_the_time_budget() {
        let inner = seeded(&[]);
        let store = Arc::new(Interfering {
            inner,
            remaining: AtomicU32::new(1000),
            fetches: AtomicU32::new(0),
        });
        let cfg = EngineConfig {
            retry: RetryPolicy {
                max_attempts: 1000,
                initial_backoff: Duration::from_secs(1),
                factor: 1.0,
                jitter: 0.0,
                max_backoff: Duration::from_secs(1),
            },
            store_timeout: Duration::from_secs(5),
            ..EngineConfig::default()
        };
        let eng = engine(store, cfg);
        let err = eng
            .apply("job-1", Delta::Increment, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobTrackError::Timeout));
    }
}
