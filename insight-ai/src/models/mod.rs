//! Data models for insight-ai

pub mod analysis;
pub mod record;

pub use analysis::{AnalysisOutcome, AnalysisReport, AnalyzerType, DataSources};
pub use record::{AnalyzableRecord, PayloadRef, RecordKind, RecordStatus, RecordUpdate};
