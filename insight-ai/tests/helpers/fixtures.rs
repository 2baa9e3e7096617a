//! Record builders and a wired-up scheduler over in-memory collaborators

use chrono::{DateTime, Utc};
use insight_ai::analyzers::{AnalysisContext, AnalyzerRegistry, EvidencePolicy};
use insight_ai::models::{
    AnalysisOutcome, AnalysisReport, AnalyzableRecord, AnalyzerType, DataSources, PayloadRef,
    RecordKind, RecordStatus,
};
use insight_ai::services::{InferenceBackend, InferenceClient};
use insight_ai::store::{MemoryRecordStore, RecordStore};
use insight_ai::utils::RetryPolicy;
use insight_ai::workflow::{Scheduler, SchedulerConfig};
use insight_common::events::EventBus;
use insight_common::{Clock, ManualClock};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::fake_backend::ScriptedBackend;

/// Smallest byte sequence `infer` recognizes as a PNG
const PNG_BYTES: [u8; 16] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
];

/// Three attempts, no delay
pub fn test_retry_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::ZERO)
}

/// Scheduler plus handles on everything it was built from
pub struct Harness {
    pub store: Arc<MemoryRecordStore>,
    pub backend: Arc<ScriptedBackend>,
    pub clock: Arc<ManualClock>,
    pub events: EventBus,
    pub scheduler: Arc<Scheduler>,
}

impl Harness {
    pub fn new(backend: ScriptedBackend) -> Self {
        let store = Arc::new(MemoryRecordStore::new());
        let backend = Arc::new(backend);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let events = EventBus::new(100);

        let scheduler = build_scheduler(
            store.clone(),
            backend.clone(),
            clock.clone(),
            events.clone(),
        );

        Self {
            store,
            backend,
            clock,
            events,
            scheduler,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Insert `record` and queue it for its kind's analyzer
    pub async fn submit(&self, record: &AnalyzableRecord) {
        self.store.insert(record).await.unwrap();
        let analyzer = record.kind.analyzer_type().unwrap();
        assert!(self.scheduler.enqueue(&record.id, analyzer));
    }

    pub async fn record(&self, id: &str) -> AnalyzableRecord {
        self.store.find_by_id(id).await.unwrap().unwrap()
    }
}

/// Scheduler with compiled-default policies and a no-delay retry policy
pub fn build_scheduler(
    store: Arc<dyn RecordStore>,
    backend: Arc<dyn InferenceBackend>,
    clock: Arc<dyn Clock>,
    events: EventBus,
) -> Arc<Scheduler> {
    let inference = InferenceClient::new(backend, test_retry_policy());
    let context = AnalysisContext::new(store, inference);
    let registry = AnalyzerRegistry::standard(EvidencePolicy::default_for);

    Arc::new(Scheduler::new(
        context,
        registry,
        clock,
        events,
        SchedulerConfig::default(),
    ))
}

/// Pending image record backed by a small PNG written into `dir`
pub fn image_record(dir: &Path, id: &str, owner: &str, now: DateTime<Utc>) -> AnalyzableRecord {
    let path = dir.join(format!("{}.png", id));
    std::fs::write(&path, PNG_BYTES).unwrap();
    AnalyzableRecord::pending(id, owner, RecordKind::Image, PayloadRef::File { path }, now)
}

/// Pending document record holding `text`
pub fn document_record(
    dir: &Path,
    id: &str,
    owner: &str,
    text: &str,
    now: DateTime<Utc>,
) -> AnalyzableRecord {
    let path = dir.join(format!("{}.txt", id));
    std::fs::write(&path, text).unwrap();
    AnalyzableRecord::pending(id, owner, RecordKind::Document, PayloadRef::File { path }, now)
}

/// Pending aggregate record that gathers from the owner's history
pub fn owner_record(id: &str, owner: &str, kind: RecordKind, now: DateTime<Utc>) -> AnalyzableRecord {
    AnalyzableRecord::pending(id, owner, kind, PayloadRef::Owner, now)
}

/// Image record already analyzed, usable as evidence
pub fn completed_image(id: &str, owner: &str, description: &str, at: DateTime<Utc>) -> AnalyzableRecord {
    let mut record = AnalyzableRecord::pending(
        id,
        owner,
        RecordKind::Image,
        PayloadRef::File {
            path: format!("{}.png", id).into(),
        },
        at,
    );
    let report = AnalysisReport::new(
        AnalyzerType::Vision,
        AnalysisOutcome::Insight {
            evidence_points: 1,
            data_sources: DataSources {
                images: 1,
                ..Default::default()
            },
            low_evidence: false,
            insight: json!({ "description": description, "confidence": 90 }),
        },
        at,
    );
    record.status = RecordStatus::Completed;
    record.result = Some(serde_json::to_value(report).unwrap());
    record
}

/// Completed profile record
pub fn profile_record(id: &str, owner: &str, at: DateTime<Utc>) -> AnalyzableRecord {
    let mut record = AnalyzableRecord::pending(id, owner, RecordKind::Profile, PayloadRef::Owner, at);
    record.status = RecordStatus::Completed;
    record.result = Some(json!({ "age_range": "30-39", "interests": ["hiking", "jazz"] }));
    record
}
