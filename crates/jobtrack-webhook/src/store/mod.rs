//! Record store seam.
//!
//! The engine only needs two operations from whatever holds the pods: a
//! name-exact lookup narrowed by a selector, and a write that is rejected when
//! the record changed since it was read.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use jobtrack_core::{PodRecord, Selector};

pub use memory::InMemoryRecordStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The record's version no longer matches the one that was read.
    #[error("the object has been modified; please apply your changes to the latest version and try again")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("{0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up at most one pod by exact name, restricted to pods matching
    /// `selector`. A pod that exists but does not match yields `Ok(None)`.
    async fn find_one(
        &self,
        namespace: &str,
        name: &str,
        selector: &Selector,
    ) -> Result<Option<PodRecord>, StoreError>;

    /// Replace the stored record if its version still equals
    /// `record.resource_version`. Returns the stored record with its new version.
    async fn conditional_update(&self, record: PodRecord) -> Result<PodRecord, StoreError>;
}
