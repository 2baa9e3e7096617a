//! Error types for insight-ai
//!
//! Error taxonomy of the analysis pipeline. `INSUFFICIENT_DATA` is not here:
//! it is a normal [`crate::models::AnalysisOutcome`]. Malformed model output is
//! absorbed by the response normalizer and never surfaces as an error.

use thiserror::Error;

use crate::models::AnalyzerType;

/// Analysis pipeline error
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Every attempt against the external inference service failed
    #[error("INFERENCE_UNAVAILABLE: inference failed after {attempts} attempts: {message}")]
    InferenceUnavailable { attempts: u32, message: String },

    /// Record vanished between enqueue and processing
    #[error("RECORD_MISSING: record {0} not found")]
    RecordMissing(String),

    /// A status transition could not be persisted
    #[error("STORE_WRITE_FAILURE: {0}")]
    StoreWrite(String),

    /// Payload unreadable or of the wrong shape for the analyzer
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// No analyzer registered for the queue entry's type
    #[error("No analyzer registered for type '{0}'")]
    UnsupportedAnalyzer(AnalyzerType),

    /// Insight could not be serialized into the result envelope
    #[error("Result serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record store read failure and other shared-layer errors
    #[error(transparent)]
    Store(#[from] insight_common::Error),
}

impl AnalysisError {
    /// Stable classification code for logs and status consumers
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::InferenceUnavailable { .. } => "INFERENCE_UNAVAILABLE",
            AnalysisError::RecordMissing(_) => "RECORD_MISSING",
            AnalysisError::StoreWrite(_) => "STORE_WRITE_FAILURE",
            AnalysisError::InvalidPayload(_) => "INVALID_PAYLOAD",
            AnalysisError::UnsupportedAnalyzer(_) => "UNSUPPORTED_ANALYZER",
            AnalysisError::Serialization(_) => "SERIALIZATION_ERROR",
            AnalysisError::Store(_) => "STORE_ERROR",
        }
    }
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_unavailable_message_carries_cause() {
        let err = AnalysisError::InferenceUnavailable {
            attempts: 3,
            message: "connection refused".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("INFERENCE_UNAVAILABLE"));
        assert!(text.contains("3 attempts"));
        assert!(text.contains("connection refused"));
        assert_eq!(err.code(), "INFERENCE_UNAVAILABLE");
    }

    #[test]
    fn test_common_error_converts() {
        let err: AnalysisError = insight_common::Error::NotFound("x".to_string()).into();
        assert_eq!(err.code(), "STORE_ERROR");
    }
}
