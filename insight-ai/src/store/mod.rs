//! Record Store interface
//!
//! Durable storage for analyzable records. The pipeline performs
//! read-modify-write on single records by id and never relies on multi-record
//! transactions; concurrent external writers (e.g. a user deleting a record
//! mid-analysis) are tolerated through existence checks.

pub mod memory;

use async_trait::async_trait;
use insight_common::Result;

use crate::models::{AnalyzableRecord, RecordKind, RecordStatus, RecordUpdate};

pub use memory::MemoryRecordStore;

/// Filter for owner history queries; empty lists match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub kinds: Vec<RecordKind>,
    pub statuses: Vec<RecordStatus>,
}

impl RecordFilter {
    /// Completed records of the given kinds
    pub fn completed(kinds: &[RecordKind]) -> Self {
        Self {
            kinds: kinds.to_vec(),
            statuses: vec![RecordStatus::Completed],
        }
    }

    pub fn matches(&self, record: &AnalyzableRecord) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&record.kind))
            && (self.statuses.is_empty() || self.statuses.contains(&record.status))
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a record (producers create records in `pending`)
    async fn insert(&self, record: &AnalyzableRecord) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<AnalyzableRecord>>;

    /// Apply a status transition; `Ok(false)` when the record does not exist
    async fn update(&self, id: &str, update: &RecordUpdate) -> Result<bool>;

    /// All records in any of `statuses`, oldest first
    ///
    /// Rows that cannot be decoded are logged and left out of list results.
    async fn find_all_by_status(&self, statuses: &[RecordStatus]) -> Result<Vec<AnalyzableRecord>>;

    /// Up to `limit` of the owner's records matching `filter`, most recently
    /// updated first
    async fn find_recent_by_owner(
        &self,
        owner_id: &str,
        filter: &RecordFilter,
        limit: usize,
    ) -> Result<Vec<AnalyzableRecord>>;
}
