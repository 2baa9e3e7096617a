//! Analyzer identities and analysis outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::RecordKind;

/// Which analyzer handles a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerType {
    Vision,
    Document,
    Trait,
    Emotion,
    Report,
}

impl AnalyzerType {
    pub const ALL: [AnalyzerType; 5] = [
        AnalyzerType::Vision,
        AnalyzerType::Document,
        AnalyzerType::Trait,
        AnalyzerType::Emotion,
        AnalyzerType::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerType::Vision => "vision",
            AnalyzerType::Document => "document",
            AnalyzerType::Trait => "trait",
            AnalyzerType::Emotion => "emotion",
            AnalyzerType::Report => "report",
        }
    }

    /// Record kind this analyzer's result is stored on
    pub fn record_kind(&self) -> RecordKind {
        match self {
            AnalyzerType::Vision => RecordKind::Image,
            AnalyzerType::Document => RecordKind::Document,
            AnalyzerType::Trait => RecordKind::TraitEstimate,
            AnalyzerType::Emotion => RecordKind::EmotionAssessment,
            AnalyzerType::Report => RecordKind::Report,
        }
    }
}

impl fmt::Display for AnalyzerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalyzerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalyzerType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown analyzer type: {}", s))
    }
}

/// Evidence breakdown by data source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSources {
    pub images: usize,
    pub documents: usize,
    pub profiles: usize,
    pub trait_estimates: usize,
    pub emotion_assessments: usize,
    pub reports: usize,
}

impl DataSources {
    /// Total evidence points
    pub fn total(&self) -> usize {
        self.images
            + self.documents
            + self.profiles
            + self.trait_estimates
            + self.emotion_assessments
            + self.reports
    }

    /// Count one more record of `kind`
    pub fn record(&mut self, kind: RecordKind) {
        match kind {
            RecordKind::Image => self.images += 1,
            RecordKind::Document => self.documents += 1,
            RecordKind::Profile => self.profiles += 1,
            RecordKind::TraitEstimate => self.trait_estimates += 1,
            RecordKind::EmotionAssessment => self.emotion_assessments += 1,
            RecordKind::Report => self.reports += 1,
        }
    }
}

/// What an analyzer produced for one record
///
/// `InsufficientData` is a normal outcome, not an error: no inference call was
/// made and the client should collect more input rather than retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Insight {
        evidence_points: usize,
        data_sources: DataSources,
        /// Evidence below the reliable threshold; confidence was penalized
        low_evidence: bool,
        insight: serde_json::Value,
    },
    InsufficientData {
        required: usize,
        available: usize,
        data_sources: DataSources,
    },
}

impl AnalysisOutcome {
    pub fn is_insufficient(&self) -> bool {
        matches!(self, AnalysisOutcome::InsufficientData { .. })
    }
}

/// Envelope persisted as a completed record's `result`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub analyzer: AnalyzerType,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: AnalysisOutcome,
}

impl AnalysisReport {
    pub fn new(analyzer: AnalyzerType, outcome: AnalysisOutcome, generated_at: DateTime<Utc>) -> Self {
        Self {
            analyzer,
            generated_at,
            outcome,
        }
    }

    /// Parse a stored result back into a report
    pub fn from_result(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// The insight object, if this report carries one
    pub fn insight(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            AnalysisOutcome::Insight { insight, .. } => Some(insight),
            AnalysisOutcome::InsufficientData { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_analyzer_type_parse() {
        assert_eq!("trait".parse::<AnalyzerType>().unwrap(), AnalyzerType::Trait);
        assert!("audio".parse::<AnalyzerType>().is_err());
    }

    #[test]
    fn test_data_sources_total() {
        let mut sources = DataSources::default();
        sources.record(RecordKind::Image);
        sources.record(RecordKind::Image);
        sources.record(RecordKind::Profile);
        assert_eq!(sources.images, 2);
        assert_eq!(sources.total(), 3);
    }

    #[test]
    fn test_report_envelope_shape() {
        let report = AnalysisReport::new(
            AnalyzerType::Trait,
            AnalysisOutcome::InsufficientData {
                required: 3,
                available: 1,
                data_sources: DataSources::default(),
            },
            Utc::now(),
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["outcome"], "insufficient_data");
        assert_eq!(value["analyzer"], "trait");
        assert_eq!(value["required"], 3);

        let parsed = AnalysisReport::from_result(&value).unwrap();
        assert!(parsed.outcome.is_insufficient());
        assert!(parsed.insight().is_none());
    }

    #[test]
    fn test_insight_envelope_exposes_insight() {
        let report = AnalysisReport::new(
            AnalyzerType::Vision,
            AnalysisOutcome::Insight {
                evidence_points: 1,
                data_sources: DataSources {
                    images: 1,
                    ..Default::default()
                },
                low_evidence: false,
                insight: json!({"description": "a cat"}),
            },
            Utc::now(),
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["outcome"], "insight");
        let parsed = AnalysisReport::from_result(&value).unwrap();
        assert_eq!(parsed.insight().unwrap()["description"], "a cat");
    }
}
