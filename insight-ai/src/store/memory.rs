//! In-memory Record Store
//!
//! Non-durable implementation used by tests and local simulations. Write
//! failures can be injected to exercise STORE_WRITE_FAILURE handling.

use async_trait::async_trait;
use insight_common::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{RecordFilter, RecordStore};
use crate::models::{AnalyzableRecord, RecordStatus, RecordUpdate};

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, AnalyzableRecord>>,
    fail_updates: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `update` fail (or succeed again)
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Remove a record, as an external writer would
    pub async fn remove(&self, id: &str) -> Option<AnalyzableRecord> {
        self.records.write().await.remove(id)
    }

    /// Overwrite a record wholesale (test seeding)
    pub async fn put(&self, record: AnalyzableRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &AnalyzableRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(Error::InvalidInput(format!(
                "record {} already exists",
                record.id
            )));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<AnalyzableRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update(&self, id: &str, update: &RecordUpdate) -> Result<bool> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Error::Internal(format!("injected write failure for {}", id)));
        }

        let mut records = self.records.write().await;
        match records.get_mut(id) {
            Some(record) => {
                update.apply_to(record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_all_by_status(&self, statuses: &[RecordStatus]) -> Result<Vec<AnalyzableRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<AnalyzableRecord> = records
            .values()
            .filter(|r| statuses.contains(&r.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn find_recent_by_owner(
        &self,
        owner_id: &str,
        filter: &RecordFilter,
        limit: usize,
    ) -> Result<Vec<AnalyzableRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<AnalyzableRecord> = records
            .values()
            .filter(|r| r.owner_id == owner_id && filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        matching.truncate(limit);
        Ok(matching)
    }
}
