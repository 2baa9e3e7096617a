//! Vision analyzer
//!
//! Describes a single uploaded image. The image bytes travel to the model as
//! base64 media; the MIME type is sniffed from content, not the file name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{AnalysisContext, Analyzer, EvidencePolicy, Gathered};
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AnalyzableRecord, AnalyzerType, DataSources, PayloadRef};
use crate::services::{Media, PromptPayload};

/// Images larger than this are rejected before any inference call
const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

const PROMPT: &str = r#"Analyze this image and describe what it shows.

Respond with ONLY a JSON object using exactly these fields:
{
  "description": "2-4 sentence description of the image",
  "objects": ["notable objects or people"],
  "scene": "setting or environment",
  "text_content": "any legible text in the image, or empty string",
  "mood": "overall mood or atmosphere",
  "tags": ["short keywords"],
  "confidence": 0-100 integer, how certain you are of this description
}"#;

/// Structured image description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageInsight {
    pub description: String,
    pub objects: Vec<String>,
    pub scene: String,
    pub text_content: String,
    pub mood: String,
    pub tags: Vec<String>,
    pub confidence: u8,
}

pub struct VisionAnalyzer {
    policy: EvidencePolicy,
}

impl VisionAnalyzer {
    pub fn new(policy: EvidencePolicy) -> Self {
        Self { policy }
    }
}

impl Default for VisionAnalyzer {
    fn default() -> Self {
        Self::new(EvidencePolicy::default_for(AnalyzerType::Vision))
    }
}

/// Read an image file and sniff its MIME type
///
/// The size limit is checked against file metadata before anything is read.
pub async fn load_image(path: &Path) -> AnalysisResult<Media> {
    let unreadable = |e: std::io::Error| {
        AnalysisError::InvalidPayload(format!("Failed to read image {}: {}", path.display(), e))
    };
    let too_large = |size: u64| {
        AnalysisError::InvalidPayload(format!(
            "Image {} is {} bytes, limit is {}",
            path.display(),
            size,
            MAX_IMAGE_BYTES
        ))
    };

    let metadata = tokio::fs::metadata(path).await.map_err(unreadable)?;
    if metadata.len() > MAX_IMAGE_BYTES as u64 {
        return Err(too_large(metadata.len()));
    }

    let bytes = tokio::fs::read(path).await.map_err(unreadable)?;
    // The file may have grown since the metadata call
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(too_large(bytes.len() as u64));
    }

    let kind = infer::get(&bytes)
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .ok_or_else(|| {
            AnalysisError::InvalidPayload(format!("{} is not a recognized image", path.display()))
        })?;

    Ok(Media {
        mime_type: kind.mime_type().to_string(),
        bytes,
    })
}

#[async_trait]
impl Analyzer for VisionAnalyzer {
    type Inputs = Media;
    type Output = ImageInsight;

    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Vision
    }

    fn policy(&self) -> EvidencePolicy {
        self.policy
    }

    async fn gather_inputs(
        &self,
        _ctx: &AnalysisContext,
        record: &AnalyzableRecord,
    ) -> AnalysisResult<Gathered<Media>> {
        let PayloadRef::File { path } = &record.payload_ref else {
            return Err(AnalysisError::InvalidPayload(format!(
                "image record {} has no file payload",
                record.id
            )));
        };

        let media = load_image(path).await?;
        tracing::debug!(
            record_id = %record.id,
            mime_type = %media.mime_type,
            bytes = media.bytes.len(),
            "Loaded image"
        );

        Ok(Gathered {
            inputs: media,
            sources: DataSources {
                images: 1,
                ..Default::default()
            },
        })
    }

    fn build_prompt(&self, inputs: &Media, _sources: &DataSources) -> PromptPayload {
        PromptPayload::text(PROMPT)
            .with_media(inputs.clone())
            .with_temperature(0.2)
    }
}
