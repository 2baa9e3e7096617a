//! Domain analyzers
//!
//! One [`Analyzer`] capability with an implementation per analysis domain. The
//! shared pipeline lives in [`run_analyzer`]:
//!
//! 1. gather evidence for the record
//! 2. threshold check (`InsufficientData`, no inference call)
//! 3. build prompt, call the inference client, normalize the response
//! 4. confidence penalty when evidence is below the reliable threshold
//!
//! The worker only sees the object-safe [`AnalyzerRunner`] via the
//! [`AnalyzerRegistry`].

pub mod document;
pub mod emotion;
pub mod evidence;
pub mod report;
pub mod traits;
pub mod vision;

use async_trait::async_trait;
use insight_common::config::PolicyOverride;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AnalysisResult;
use crate::models::{AnalysisOutcome, AnalyzableRecord, AnalyzerType, DataSources};
use crate::services::{normalize, InferenceClient, PromptPayload};
use crate::store::RecordStore;

pub use document::DocumentAnalyzer;
pub use emotion::EmotionAnalyzer;
pub use report::ReportAnalyzer;
pub use traits::TraitAnalyzer;
pub use vision::VisionAnalyzer;

/// Dependencies every analyzer runs against
#[derive(Clone)]
pub struct AnalysisContext {
    pub store: Arc<dyn RecordStore>,
    pub inference: InferenceClient,
}

impl AnalysisContext {
    pub fn new(store: Arc<dyn RecordStore>, inference: InferenceClient) -> Self {
        Self { store, inference }
    }
}

/// Evidence thresholds and low-evidence confidence penalty for one domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidencePolicy {
    /// Below this, the analyzer reports insufficient data
    pub min_evidence: usize,
    /// Below this, confidence scores are penalized
    pub reliable_evidence: usize,
    pub penalty: u8,
    pub floor: u8,
}

impl EvidencePolicy {
    pub const fn new(min_evidence: usize, reliable_evidence: usize, penalty: u8, floor: u8) -> Self {
        Self {
            min_evidence,
            reliable_evidence,
            penalty,
            floor,
        }
    }

    /// Compiled-in policy for an analyzer type
    pub const fn default_for(analyzer: AnalyzerType) -> Self {
        match analyzer {
            AnalyzerType::Vision | AnalyzerType::Document => Self::new(1, 1, 0, 30),
            AnalyzerType::Trait => Self::new(3, 5, 20, 30),
            AnalyzerType::Emotion => Self::new(3, 10, 15, 30),
            AnalyzerType::Report => Self::new(3, 5, 10, 30),
        }
    }

    /// Policy with any configured fields replaced
    pub fn with_override(self, overrides: &PolicyOverride) -> Self {
        Self {
            min_evidence: overrides.min_evidence.unwrap_or(self.min_evidence),
            reliable_evidence: overrides.reliable_evidence.unwrap_or(self.reliable_evidence),
            penalty: overrides.penalty.unwrap_or(self.penalty),
            floor: overrides.floor.unwrap_or(self.floor),
        }
    }

    pub fn is_sufficient(&self, evidence_points: usize) -> bool {
        evidence_points >= self.min_evidence
    }

    pub fn is_low_evidence(&self, evidence_points: usize) -> bool {
        evidence_points < self.reliable_evidence
    }

    /// Confidence after the low-evidence penalty: `max(score - penalty, floor)`
    ///
    /// Scores with enough evidence pass through unchanged (clamped to 0..=100).
    pub fn adjust(&self, score: u8, evidence_points: usize) -> u8 {
        let score = score.min(100);
        if !self.is_low_evidence(evidence_points) {
            return score;
        }
        let penalized = i32::from(score) - i32::from(self.penalty);
        penalized.max(i32::from(self.floor)).clamp(0, 100) as u8
    }
}

/// Analyzer inputs with the evidence breakdown that produced them
#[derive(Debug, Clone)]
pub struct Gathered<I> {
    pub inputs: I,
    pub sources: DataSources,
}

/// One analysis domain
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Evidence handed from `gather_inputs` to `build_prompt`
    type Inputs: Send + Sync;
    /// Insight shape; `Default` is the degraded result
    type Output: Default + Serialize + DeserializeOwned + Send;

    fn analyzer_type(&self) -> AnalyzerType;

    fn policy(&self) -> EvidencePolicy;

    async fn gather_inputs(
        &self,
        ctx: &AnalysisContext,
        record: &AnalyzableRecord,
    ) -> AnalysisResult<Gathered<Self::Inputs>>;

    fn build_prompt(&self, inputs: &Self::Inputs, sources: &DataSources) -> PromptPayload;

    /// Penalize model-reported confidence fields for thin evidence
    fn apply_confidence_penalty(&self, _output: &mut Self::Output, _evidence_points: usize) {}
}

/// Run the shared analysis pipeline for one record
pub async fn run_analyzer<A: Analyzer>(
    analyzer: &A,
    ctx: &AnalysisContext,
    record: &AnalyzableRecord,
) -> AnalysisResult<AnalysisOutcome> {
    let analyzer_type = Analyzer::analyzer_type(analyzer);
    let policy = analyzer.policy();

    let Gathered { inputs, sources } = analyzer.gather_inputs(ctx, record).await?;
    let evidence_points = sources.total();

    if !policy.is_sufficient(evidence_points) {
        tracing::info!(
            record_id = %record.id,
            analyzer = %analyzer_type,
            evidence_points,
            required = policy.min_evidence,
            "Insufficient evidence, skipping inference"
        );
        return Ok(AnalysisOutcome::InsufficientData {
            required: policy.min_evidence,
            available: evidence_points,
            data_sources: sources,
        });
    }

    let prompt = analyzer.build_prompt(&inputs, &sources);
    let raw = ctx.inference.complete(&prompt).await?;

    let mut output: A::Output = normalize(&raw, analyzer_type.as_str());
    let low_evidence = policy.is_low_evidence(evidence_points);
    if low_evidence {
        tracing::debug!(
            record_id = %record.id,
            analyzer = %analyzer_type,
            evidence_points,
            reliable = policy.reliable_evidence,
            "Low evidence, applying confidence penalty"
        );
        analyzer.apply_confidence_penalty(&mut output, evidence_points);
    }

    Ok(AnalysisOutcome::Insight {
        evidence_points,
        data_sources: sources,
        low_evidence,
        insight: serde_json::to_value(&output)?,
    })
}

/// Object-safe view of an analyzer used by the worker
#[async_trait]
pub trait AnalyzerRunner: Send + Sync {
    fn analyzer_type(&self) -> AnalyzerType;

    async fn analyze(
        &self,
        ctx: &AnalysisContext,
        record: &AnalyzableRecord,
    ) -> AnalysisResult<AnalysisOutcome>;
}

#[async_trait]
impl<A: Analyzer> AnalyzerRunner for A {
    fn analyzer_type(&self) -> AnalyzerType {
        Analyzer::analyzer_type(self)
    }

    async fn analyze(
        &self,
        ctx: &AnalysisContext,
        record: &AnalyzableRecord,
    ) -> AnalysisResult<AnalysisOutcome> {
        run_analyzer(self, ctx, record).await
    }
}

/// Analyzer lookup by type
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    runners: HashMap<AnalyzerType, Arc<dyn AnalyzerRunner>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in analyzers, policies resolved by `policy_for`
    pub fn standard(policy_for: impl Fn(AnalyzerType) -> EvidencePolicy) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(VisionAnalyzer::new(policy_for(AnalyzerType::Vision))));
        registry.register(Arc::new(DocumentAnalyzer::new(policy_for(AnalyzerType::Document))));
        registry.register(Arc::new(TraitAnalyzer::new(policy_for(AnalyzerType::Trait))));
        registry.register(Arc::new(EmotionAnalyzer::new(policy_for(AnalyzerType::Emotion))));
        registry.register(Arc::new(ReportAnalyzer::new(policy_for(AnalyzerType::Report))));
        registry
    }

    /// Register (or replace) the runner for its type
    pub fn register(&mut self, runner: Arc<dyn AnalyzerRunner>) {
        self.runners.insert(runner.analyzer_type(), runner);
    }

    pub fn get(&self, analyzer: AnalyzerType) -> Option<Arc<dyn AnalyzerRunner>> {
        self.runners.get(&analyzer).cloned()
    }

    pub fn contains(&self, analyzer: AnalyzerType) -> bool {
        self.runners.contains_key(&analyzer)
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }
}

/// Truncate to at most `max_chars` characters
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
