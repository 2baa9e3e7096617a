//! Evidence gathering for aggregate analyzers
//!
//! Evidence comes from the owner's recent completed records, or from an
//! explicit `records { ids }` payload. Only records that carry a usable body
//! count as evidence points: an `insight` envelope, or a profile object.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AnalysisReport, AnalyzableRecord, DataSources, PayloadRef, RecordKind, RecordStatus};
use crate::store::{RecordFilter, RecordStore};

use super::truncate_chars;

/// Characters of one evidence body included in a prompt
const MAX_ITEM_CHARS: usize = 2000;

/// How many of each kind to gather, most recent first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidenceRequest {
    pub kind: RecordKind,
    pub limit: usize,
}

impl EvidenceRequest {
    pub const fn new(kind: RecordKind, limit: usize) -> Self {
        Self { kind, limit }
    }
}

/// One prior record used as evidence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceItem {
    pub record_id: String,
    pub kind: RecordKind,
    pub updated_at: DateTime<Utc>,
    /// Insight object (analyzed kinds) or profile object
    pub content: serde_json::Value,
}

impl EvidenceItem {
    /// Build from a record, `None` if it carries nothing usable
    pub fn from_record(record: &AnalyzableRecord) -> Option<Self> {
        if record.status != RecordStatus::Completed {
            return None;
        }
        let result = record.result.as_ref()?;

        let content = match record.kind {
            RecordKind::Profile => result.is_object().then(|| result.clone())?,
            _ => AnalysisReport::from_result(result)?.insight()?.clone(),
        };

        Some(Self {
            record_id: record.id.clone(),
            kind: record.kind,
            updated_at: record.updated_at,
            content,
        })
    }

    /// Compact JSON body, truncated for prompt use
    pub fn prompt_text(&self) -> String {
        let text = self.content.to_string();
        truncate_chars(&text, MAX_ITEM_CHARS).to_string()
    }
}

/// Gathered evidence, grouped in request order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evidence {
    pub items: Vec<EvidenceItem>,
    pub sources: DataSources,
}

impl Evidence {
    fn push(&mut self, item: EvidenceItem) {
        self.sources.record(item.kind);
        self.items.push(item);
    }

    pub fn of_kind(&self, kind: RecordKind) -> impl Iterator<Item = &EvidenceItem> {
        self.items.iter().filter(move |item| item.kind == kind)
    }

    /// Most recent item of `kind`
    pub fn latest(&self, kind: RecordKind) -> Option<&EvidenceItem> {
        self.of_kind(kind).max_by_key(|item| item.updated_at)
    }
}

/// Append a numbered prompt section for one evidence kind; nothing when empty
pub(crate) fn write_evidence_section(prompt: &mut String, title: &str, evidence: &Evidence, kind: RecordKind) {
    let mut items = evidence.of_kind(kind).peekable();
    if items.peek().is_none() {
        return;
    }
    let _ = writeln!(prompt, "\n## {}", title);
    for (index, item) in items.enumerate() {
        let _ = writeln!(prompt, "{}. {}", index + 1, item.prompt_text());
    }
}

/// Gather evidence for `record` according to its payload reference
pub async fn gather_evidence(
    store: &dyn RecordStore,
    record: &AnalyzableRecord,
    requests: &[EvidenceRequest],
) -> AnalysisResult<Evidence> {
    match &record.payload_ref {
        PayloadRef::Owner => gather_from_owner(store, record, requests).await,
        PayloadRef::Records { ids } => gather_from_ids(store, record, ids, requests).await,
        PayloadRef::File { path } => Err(AnalysisError::InvalidPayload(format!(
            "{} analysis expects owner history or record ids, got file {}",
            record.kind,
            path.display()
        ))),
    }
}

async fn gather_from_owner(
    store: &dyn RecordStore,
    record: &AnalyzableRecord,
    requests: &[EvidenceRequest],
) -> AnalysisResult<Evidence> {
    let mut evidence = Evidence::default();

    for request in requests {
        recent_usable(store, record, *request)
            .await?
            .into_iter()
            .for_each(|item| evidence.push(item));
    }

    tracing::debug!(
        record_id = %record.id,
        owner_id = %record.owner_id,
        evidence_points = evidence.sources.total(),
        "Gathered owner evidence"
    );

    Ok(evidence)
}

/// Up to `request.limit` usable items of one kind, most recent first
///
/// Completed records without a usable body (an `insufficient_data` envelope,
/// a non-object profile) do not count toward the limit, so the window widens
/// until enough are found or the owner's history runs out.
async fn recent_usable(
    store: &dyn RecordStore,
    record: &AnalyzableRecord,
    request: EvidenceRequest,
) -> AnalysisResult<Vec<EvidenceItem>> {
    let filter = RecordFilter::completed(&[request.kind]);
    let mut window = request.limit.max(1);

    loop {
        let candidates = store
            .find_recent_by_owner(&record.owner_id, &filter, window)
            .await?;

        let usable: Vec<EvidenceItem> = candidates
            .iter()
            .filter(|candidate| candidate.id != record.id)
            .filter_map(EvidenceItem::from_record)
            .take(request.limit)
            .collect();

        if usable.len() >= request.limit || candidates.len() < window {
            return Ok(usable);
        }
        window = window.saturating_mul(2);
    }
}

async fn gather_from_ids(
    store: &dyn RecordStore,
    record: &AnalyzableRecord,
    ids: &[String],
    requests: &[EvidenceRequest],
) -> AnalysisResult<Evidence> {
    let mut candidates = Vec::with_capacity(ids.len());
    for id in ids {
        match store.find_by_id(id).await? {
            Some(candidate) if candidate.owner_id != record.owner_id => {
                tracing::warn!(
                    record_id = %record.id,
                    evidence_id = %id,
                    "Evidence record belongs to another owner, ignoring"
                );
            }
            Some(candidate) => candidates.push(candidate),
            None => {
                tracing::warn!(record_id = %record.id, evidence_id = %id, "Evidence record not found");
            }
        }
    }
    candidates.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    let mut evidence = Evidence::default();
    for request in requests {
        candidates
            .iter()
            .filter(|candidate| candidate.kind == request.kind)
            .filter_map(EvidenceItem::from_record)
            .take(request.limit)
            .for_each(|item| evidence.push(item));
    }

    Ok(evidence)
}
