//! Record status lookup
//!
//! The `{status, result, error, updatedAt}` view a collaborator API layer
//! serves for a record id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AnalysisOutcome, AnalysisReport, AnalyzableRecord, RecordStatus};
use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStatusView {
    pub status: RecordStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// `completed` only because evidence was short; clients should collect
    /// more input rather than retry
    pub insufficient_data: bool,
}

impl From<AnalyzableRecord> for RecordStatusView {
    fn from(record: AnalyzableRecord) -> Self {
        let insufficient_data = record
            .result
            .as_ref()
            .and_then(AnalysisReport::from_result)
            .map(|report| matches!(report.outcome, AnalysisOutcome::InsufficientData { .. }))
            .unwrap_or(false);

        Self {
            status: record.status,
            result: record.result,
            error: record.error,
            updated_at: record.updated_at,
            insufficient_data,
        }
    }
}

/// Current status of a record, `None` if it does not exist
pub async fn record_status(
    store: &dyn RecordStore,
    record_id: &str,
) -> insight_common::Result<Option<RecordStatusView>> {
    Ok(store.find_by_id(record_id).await?.map(RecordStatusView::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalyzerType, DataSources, PayloadRef, RecordKind, RecordUpdate};
    use crate::store::MemoryRecordStore;

    #[tokio::test]
    async fn test_missing_record_has_no_status() {
        let store = MemoryRecordStore::new();
        assert!(record_status(&store, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insufficient_data_flagged() {
        let store = MemoryRecordStore::new();
        let now = Utc::now();
        let record = AnalyzableRecord::pending("t-1", "u-1", RecordKind::TraitEstimate, PayloadRef::Owner, now);
        store.insert(&record).await.unwrap();

        let report = AnalysisReport::new(
            AnalyzerType::Trait,
            AnalysisOutcome::InsufficientData {
                required: 3,
                available: 1,
                data_sources: DataSources::default(),
            },
            now,
        );
        store
            .update("t-1", &RecordUpdate::completed(serde_json::to_value(&report).unwrap(), now))
            .await
            .unwrap();

        let view = record_status(&store, "t-1").await.unwrap().unwrap();
        assert_eq!(view.status, RecordStatus::Completed);
        assert!(view.insufficient_data);
        assert!(view.error.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(json.get("updatedAt").is_some());
    }
}
