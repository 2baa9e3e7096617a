//! Emotional health assessment
//!
//! Draws mostly on written documents, with image analyses and the profile as
//! supporting context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::evidence::{gather_evidence, write_evidence_section, Evidence, EvidenceRequest};
use super::{AnalysisContext, Analyzer, EvidencePolicy, Gathered};
use crate::error::AnalysisResult;
use crate::models::{AnalyzableRecord, AnalyzerType, DataSources, RecordKind};
use crate::services::PromptPayload;

const EVIDENCE: [EvidenceRequest; 3] = [
    EvidenceRequest::new(RecordKind::Document, 100),
    EvidenceRequest::new(RecordKind::Image, 100),
    EvidenceRequest::new(RecordKind::Profile, 1),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionAssessment {
    /// 0-100, higher is healthier
    pub wellbeing_score: u8,
    pub dominant_mood: String,
    /// 0-100
    pub stress_level: u8,
    /// 0-100
    pub anxiety_level: u8,
    pub positive_indicators: Vec<String>,
    pub concerns: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence: u8,
}

pub struct EmotionAnalyzer {
    policy: EvidencePolicy,
}

impl EmotionAnalyzer {
    pub fn new(policy: EvidencePolicy) -> Self {
        Self { policy }
    }
}

impl Default for EmotionAnalyzer {
    fn default() -> Self {
        Self::new(EvidencePolicy::default_for(AnalyzerType::Emotion))
    }
}

#[async_trait]
impl Analyzer for EmotionAnalyzer {
    type Inputs = Evidence;
    type Output = EmotionAssessment;

    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Emotion
    }

    fn policy(&self) -> EvidencePolicy {
        self.policy
    }

    async fn gather_inputs(
        &self,
        ctx: &AnalysisContext,
        record: &AnalyzableRecord,
    ) -> AnalysisResult<Gathered<Evidence>> {
        let evidence = gather_evidence(ctx.store.as_ref(), record, &EVIDENCE).await?;
        let sources = evidence.sources;
        Ok(Gathered {
            inputs: evidence,
            sources,
        })
    }

    fn build_prompt(&self, evidence: &Evidence, sources: &DataSources) -> PromptPayload {
        let mut prompt = format!(
            "Assess the user's emotional health from the material below \
             ({} documents, {} images, {} profile). Be supportive and \
             non-clinical; this is not a diagnosis.\n",
            sources.documents, sources.images, sources.profiles
        );

        write_evidence_section(&mut prompt, "Profile", evidence, RecordKind::Profile);
        write_evidence_section(&mut prompt, "Writing", evidence, RecordKind::Document);
        write_evidence_section(&mut prompt, "Images", evidence, RecordKind::Image);

        prompt.push_str(
            r#"
Respond with ONLY a JSON object using exactly these fields. Scores and
confidence are integers from 0 to 100:
{
  "wellbeing_score": 0,
  "dominant_mood": "",
  "stress_level": 0,
  "anxiety_level": 0,
  "positive_indicators": [],
  "concerns": [],
  "recommendations": [],
  "confidence": 0
}"#,
        );

        PromptPayload::text(prompt).with_temperature(0.3)
    }

    fn apply_confidence_penalty(&self, output: &mut EmotionAssessment, evidence_points: usize) {
        output.confidence = self.policy.adjust(output.confidence, evidence_points);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_penalty_uses_emotion_policy() {
        let analyzer = EmotionAnalyzer::default();
        let mut assessment = EmotionAssessment {
            wellbeing_score: 70,
            confidence: 90,
            ..Default::default()
        };

        analyzer.apply_confidence_penalty(&mut assessment, 6);
        assert_eq!(assessment.confidence, 75);
        assert_eq!(assessment.wellbeing_score, 70);

        analyzer.apply_confidence_penalty(&mut assessment, 12);
        assert_eq!(assessment.confidence, 75);
    }

    #[test]
    fn test_prompt_skips_empty_sections() {
        let analyzer = EmotionAnalyzer::default();
        let prompt = analyzer.build_prompt(&Evidence::default(), &DataSources::default());
        assert!(!prompt.text.contains("## Writing"));
        assert!(prompt.text.contains("\"wellbeing_score\""));
    }
}
