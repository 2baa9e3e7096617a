//! Personality trait estimation
//!
//! Big Five estimate from the owner's analyzed images and documents plus the
//! latest profile.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::evidence::{gather_evidence, write_evidence_section, Evidence, EvidenceRequest};
use super::{AnalysisContext, Analyzer, EvidencePolicy, Gathered};
use crate::error::AnalysisResult;
use crate::models::{AnalyzableRecord, AnalyzerType, DataSources, RecordKind};
use crate::services::PromptPayload;

const EVIDENCE: [EvidenceRequest; 3] = [
    EvidenceRequest::new(RecordKind::Image, 50),
    EvidenceRequest::new(RecordKind::Document, 50),
    EvidenceRequest::new(RecordKind::Profile, 1),
];

/// One trait dimension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraitScore {
    /// 0-100 position on the dimension
    pub score: u8,
    /// 0-100 certainty of `score`
    pub confidence: u8,
    pub rationale: String,
}

/// Big Five personality estimate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraitEstimate {
    pub openness: TraitScore,
    pub conscientiousness: TraitScore,
    pub extraversion: TraitScore,
    pub agreeableness: TraitScore,
    pub neuroticism: TraitScore,
    pub summary: String,
    /// Overall certainty of the estimate
    pub confidence: u8,
}

impl TraitEstimate {
    fn dimensions_mut(&mut self) -> [&mut TraitScore; 5] {
        [
            &mut self.openness,
            &mut self.conscientiousness,
            &mut self.extraversion,
            &mut self.agreeableness,
            &mut self.neuroticism,
        ]
    }
}

pub struct TraitAnalyzer {
    policy: EvidencePolicy,
}

impl TraitAnalyzer {
    pub fn new(policy: EvidencePolicy) -> Self {
        Self { policy }
    }
}

impl Default for TraitAnalyzer {
    fn default() -> Self {
        Self::new(EvidencePolicy::default_for(AnalyzerType::Trait))
    }
}

#[async_trait]
impl Analyzer for TraitAnalyzer {
    type Inputs = Evidence;
    type Output = TraitEstimate;

    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Trait
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
            "Estimate the user's Big Five personality traits from the evidence below \
             ({} data points: {} image analyses, {} document analyses, {} profile).\n",
            sources.total(),
            sources.images,
            sources.documents,
            sources.profiles
        );

        write_evidence_section(&mut prompt, "Profile", evidence, RecordKind::Profile);
        write_evidence_section(&mut prompt, "Image analyses", evidence, RecordKind::Image);
        write_evidence_section(&mut prompt, "Document analyses", evidence, RecordKind::Document);

        prompt.push_str(
            r#"
Respond with ONLY a JSON object using exactly these fields. Every score and
confidence is an integer from 0 to 100:
{
  "openness": {"score": 0, "confidence": 0, "rationale": ""},
  "conscientiousness": {"score": 0, "confidence": 0, "rationale": ""},
  "extraversion": {"score": 0, "confidence": 0, "rationale": ""},
  "agreeableness": {"score": 0, "confidence": 0, "rationale": ""},
  "neuroticism": {"score": 0, "confidence": 0, "rationale": ""},
  "summary": "2-3 sentence overview",
  "confidence": 0
}"#,
        );

        PromptPayload::text(prompt).with_temperature(0.3)
    }

    fn apply_confidence_penalty(&self, output: &mut TraitEstimate, evidence_points: usize) {
        let policy = self.policy;
        for dimension in output.dimensions_mut() {
            dimension.confidence = policy.adjust(dimension.confidence, evidence_points);
        }
        output.confidence = policy.adjust(output.confidence, evidence_points);
    }
}
