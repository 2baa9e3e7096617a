//! Analyzable record model
//!
//! `status` is the only durable source of truth for work state; the in-memory
//! queue is rebuilt from it on startup.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::AnalyzerType;

/// Work state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Analyzing,
    Completed,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Analyzing => "analyzing",
            RecordStatus::Completed => "completed",
            RecordStatus::Failed => "failed",
        }
    }

    /// Terminal from the worker's point of view
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordStatus::Completed | RecordStatus::Failed)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecordStatus::Pending),
            "analyzing" => Ok(RecordStatus::Analyzing),
            "completed" => Ok(RecordStatus::Completed),
            "failed" => Ok(RecordStatus::Failed),
            other => Err(format!("unknown record status: {}", other)),
        }
    }
}

/// What a record holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Uploaded image, analyzed by the vision analyzer
    Image,
    /// Uploaded text document
    Document,
    /// Aggregated user profile; created already `completed`, never analyzed
    Profile,
    /// Personality (trait) estimate
    TraitEstimate,
    /// Emotional health assessment
    EmotionAssessment,
    /// Composite report
    Report,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Image => "image",
            RecordKind::Document => "document",
            RecordKind::Profile => "profile",
            RecordKind::TraitEstimate => "trait_estimate",
            RecordKind::EmotionAssessment => "emotion_assessment",
            RecordKind::Report => "report",
        }
    }

    /// Analyzer that produces this record's result, if any
    pub fn analyzer_type(&self) -> Option<AnalyzerType> {
        match self {
            RecordKind::Image => Some(AnalyzerType::Vision),
            RecordKind::Document => Some(AnalyzerType::Document),
            RecordKind::TraitEstimate => Some(AnalyzerType::Trait),
            RecordKind::EmotionAssessment => Some(AnalyzerType::Emotion),
            RecordKind::Report => Some(AnalyzerType::Report),
            RecordKind::Profile => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(RecordKind::Image),
            "document" => Ok(RecordKind::Document),
            "profile" => Ok(RecordKind::Profile),
            "trait_estimate" => Ok(RecordKind::TraitEstimate),
            "emotion_assessment" => Ok(RecordKind::EmotionAssessment),
            "report" => Ok(RecordKind::Report),
            other => Err(format!("unknown record kind: {}", other)),
        }
    }
}

/// Reference to the content a record is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayloadRef {
    /// A file on disk (image or document)
    File { path: PathBuf },
    /// An explicit set of related records to use as evidence
    Records { ids: Vec<String> },
    /// Gather evidence from the owner's recent history
    Owner,
}

/// Persisted unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzableRecord {
    pub id: String,
    pub owner_id: String,
    pub kind: RecordKind,
    pub payload_ref: PayloadRef,
    pub status: RecordStatus,
    /// Present only when `status = completed`
    pub result: Option<serde_json::Value>,
    /// Present only when `status = failed`
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Last status transition
    pub updated_at: DateTime<Utc>,
}

impl AnalyzableRecord {
    /// New `pending` record
    pub fn pending(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        kind: RecordKind,
        payload_ref: PayloadRef,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            kind,
            payload_ref,
            status: RecordStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// New `pending` record with a generated UUID v4 id
    pub fn with_generated_id(
        owner_id: impl Into<String>,
        kind: RecordKind,
        payload_ref: PayloadRef,
        now: DateTime<Utc>,
    ) -> Self {
        Self::pending(uuid::Uuid::new_v4().to_string(), owner_id, kind, payload_ref, now)
    }

    /// `analyzing` for longer than `threshold`
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.status == RecordStatus::Analyzing && now - self.updated_at > threshold
    }
}

/// A status transition written through `RecordStore::update`
///
/// Constructors keep `result`/`error` consistent with the target status.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub status: RecordStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RecordUpdate {
    /// Back to `pending` (stale-lock demotion, operator retry)
    pub fn pending(now: DateTime<Utc>) -> Self {
        Self {
            status: RecordStatus::Pending,
            result: None,
            error: None,
            updated_at: now,
        }
    }

    /// Claimed by the worker; clears any previous error
    pub fn analyzing(now: DateTime<Utc>) -> Self {
        Self {
            status: RecordStatus::Analyzing,
            result: None,
            error: None,
            updated_at: now,
        }
    }

    pub fn completed(result: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            status: RecordStatus::Completed,
            result: Some(result),
            error: None,
            updated_at: now,
        }
    }

    pub fn failed(error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: RecordStatus::Failed,
            result: None,
            error: Some(error.into()),
            updated_at: now,
        }
    }

    /// Apply this transition to an in-memory record
    pub fn apply_to(&self, record: &mut AnalyzableRecord) {
        record.status = self.status;
        record.result = self.result.clone();
        record.error = self.error.clone();
        record.updated_at = self.updated_at;
    }
}
