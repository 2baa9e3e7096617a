//! Composite report
//!
//! Combines the latest trait estimate and emotion assessment with prior
//! reports and the raw analysis history into a narrative report.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use super::evidence::{gather_evidence, write_evidence_section, Evidence, EvidenceRequest};
use super::{AnalysisContext, Analyzer, EvidencePolicy, Gathered};
use crate::error::AnalysisResult;
use crate::models::{AnalyzableRecord, AnalyzerType, DataSources, RecordKind};
use crate::services::PromptPayload;

const EVIDENCE: [EvidenceRequest; 5] = [
    EvidenceRequest::new(RecordKind::TraitEstimate, 1),
    EvidenceRequest::new(RecordKind::EmotionAssessment, 1),
    EvidenceRequest::new(RecordKind::Report, 5),
    EvidenceRequest::new(RecordKind::Image, 100),
    EvidenceRequest::new(RecordKind::Document, 100),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeReport {
    pub title: String,
    pub executive_summary: String,
    pub personality_overview: String,
    pub emotional_overview: String,
    /// What changed since the previous reports
    pub trends: Vec<String>,
    pub highlights: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence: u8,
}

pub struct ReportAnalyzer {
    policy: EvidencePolicy,
}

impl ReportAnalyzer {
    pub fn new(policy: EvidencePolicy) -> Self {
        Self { policy }
    }
}

impl Default for ReportAnalyzer {
    fn default() -> Self {
        Self::new(EvidencePolicy::default_for(AnalyzerType::Report))
    }
}

#[async_trait]
impl Analyzer for ReportAnalyzer {
    type Inputs = Evidence;
    type Output = CompositeReport;

    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Report
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
            "Write a personal insight report for the user from {} data points.\n",
            sources.total()
        );

        match evidence.latest(RecordKind::TraitEstimate) {
            Some(item) => {
                let _ = writeln!(prompt, "\n## Personality estimate\n{}", item.prompt_text());
            }
            None => prompt.push_str("\n## Personality estimate\n(not available)\n"),
        }
        match evidence.latest(RecordKind::EmotionAssessment) {
            Some(item) => {
                let _ = writeln!(prompt, "\n## Emotional assessment\n{}", item.prompt_text());
            }
            None => prompt.push_str("\n## Emotional assessment\n(not available)\n"),
        }

        write_evidence_section(&mut prompt, "Previous reports (newest first)", evidence, RecordKind::Report);
        write_evidence_section(&mut prompt, "Image analyses", evidence, RecordKind::Image);
        write_evidence_section(&mut prompt, "Document analyses", evidence, RecordKind::Document);

        prompt.push_str(
            r#"
Respond with ONLY a JSON object using exactly these fields; confidence is an
integer from 0 to 100:
{
  "title": "",
  "executive_summary": "",
  "personality_overview": "",
  "emotional_overview": "",
  "trends": [],
  "highlights": [],
  "recommendations": [],
  "confidence": 0
}"#,
        );

        PromptPayload::text(prompt)
            .with_temperature(0.5)
            .with_max_tokens(2500)
    }

    fn apply_confidence_penalty(&self, output: &mut CompositeReport, evidence_points: usize) {
        output.confidence = self.policy.adjust(output.confidence, evidence_points);
    }
}
