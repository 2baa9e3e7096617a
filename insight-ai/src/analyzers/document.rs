//! Document analyzer
//!
//! Summarizes a single uploaded text document.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{truncate_chars, AnalysisContext, Analyzer, EvidencePolicy, Gathered};
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AnalyzableRecord, AnalyzerType, DataSources, PayloadRef};
use crate::services::PromptPayload;

/// Characters of document text sent to the model
pub const MAX_DOCUMENT_CHARS: usize = 12_000;

/// Structured document summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentInsight {
    pub summary: String,
    pub key_topics: Vec<String>,
    pub sentiment: String,
    pub writing_style: String,
    pub themes: Vec<String>,
    pub confidence: u8,
}

/// Text handed to the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentText {
    pub text: String,
    /// Original length exceeded the prompt limit
    pub truncated: bool,
}

pub struct DocumentAnalyzer {
    policy: EvidencePolicy,
}

impl DocumentAnalyzer {
    pub fn new(policy: EvidencePolicy) -> Self {
        Self { policy }
    }
}

impl Default for DocumentAnalyzer {
    fn default() -> Self {
        Self::new(EvidencePolicy::default_for(AnalyzerType::Document))
    }
}

/// Read a document as lossy UTF-8, truncated to [`MAX_DOCUMENT_CHARS`]
pub async fn load_document(path: &Path) -> AnalysisResult<DocumentText> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        AnalysisError::InvalidPayload(format!("Failed to read document {}: {}", path.display(), e))
    })?;

    let text = String::from_utf8_lossy(&bytes);
    let text = text.trim();
    if text.is_empty() {
        return Err(AnalysisError::InvalidPayload(format!(
            "Document {} contains no text",
            path.display()
        )));
    }

    let kept = truncate_chars(text, MAX_DOCUMENT_CHARS);
    Ok(DocumentText {
        truncated: kept.len() < text.len(),
        text: kept.to_string(),
    })
}

#[async_trait]
impl Analyzer for DocumentAnalyzer {
    type Inputs = DocumentText;
    type Output = DocumentInsight;

    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Document
    }

    fn policy(&self) -> EvidencePolicy {
        self.policy
    }

    async fn gather_inputs(
        &self,
        _ctx: &AnalysisContext,
        record: &AnalyzableRecord,
    ) -> AnalysisResult<Gathered<DocumentText>> {
        let PayloadRef::File { path } = &record.payload_ref else {
            return Err(AnalysisError::InvalidPayload(format!(
                "document record {} has no file payload",
                record.id
            )));
        };

        let document = load_document(path).await?;
        if document.truncated {
            tracing::debug!(record_id = %record.id, "Document truncated for analysis");
        }

        Ok(Gathered {
            inputs: document,
            sources: DataSources {
                documents: 1,
                ..Default::default()
            },
        })
    }

    fn build_prompt(&self, inputs: &DocumentText, _sources: &DataSources) -> PromptPayload {
        let note = if inputs.truncated {
            "\n(The document was truncated; analyze the portion shown.)"
        } else {
            ""
        };

        PromptPayload::text(format!(
            r#"Analyze the following document written by the user.{note}

--- DOCUMENT START ---
{text}
--- DOCUMENT END ---

Respond with ONLY a JSON object using exactly these fields:
{{
  "summary": "3-5 sentence summary",
  "key_topics": ["main topics"],
  "sentiment": "positive | neutral | negative | mixed",
  "writing_style": "short description of tone and style",
  "themes": ["recurring themes or concerns"],
  "confidence": 0-100 integer
}}"#,
            note = note,
            text = inputs.text,
        ))
        .with_temperature(0.3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_document_lossy_utf8() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"Dear diary \xFF today was good").unwrap();

        let doc = load_document(file.path()).await.unwrap();
        assert!(doc.text.starts_with("Dear diary"));
        assert!(doc.text.contains('\u{FFFD}'));
        assert!(!doc.truncated);
    }

    #[tokio::test]
    async fn test_load_document_truncates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all("é".repeat(MAX_DOCUMENT_CHARS + 10).as_bytes()).unwrap();

        let doc = load_document(file.path()).await.unwrap();
        assert_eq!(doc.text.chars().count(), MAX_DOCUMENT_CHARS);
        assert!(doc.truncated);
    }

    #[tokio::test]
    async fn test_load_document_rejects_blank() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"   \n\t ").unwrap();

        let err = load_document(file.path()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidPayload(_)));
    }

    #[test]
    fn test_prompt_embeds_text() {
        let analyzer = DocumentAnalyzer::default();
        let prompt = analyzer.build_prompt(
            &DocumentText {
                text: "I went hiking.".to_string(),
                truncated: false,
            },
            &DataSources::default(),
        );
        assert!(prompt.text.contains("I went hiking."));
        assert!(prompt.text.contains("\"key_topics\""));
        assert!(prompt.media.is_none());
    }
}
