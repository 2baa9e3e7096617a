//! Configuration resolution for insight-ai
//!
//! Multi-tier resolution with Database → ENV → TOML priority for secrets, and
//! TOML-over-defaults for worker tuning and per-analyzer evidence policies.

use chrono::Duration;
use insight_common::config::{TomlConfig, WorkerConfig};
use insight_common::Result;
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

use crate::analyzers::EvidencePolicy;
use crate::models::AnalyzerType;
use crate::utils::RetryPolicy;
use crate::workflow::SchedulerConfig;

/// Environment variable holding the inference API key
pub const INFERENCE_API_KEY_ENV: &str = "INSIGHT_INFERENCE_API_KEY";

/// Resolve the inference API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
///
/// A missing key is not an error: local endpoints usually need none.
pub async fn resolve_inference_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    let db_key = crate::db::settings::get_inference_api_key(db)
        .await?
        .filter(|key| is_valid_key(key));
    let env_key = std::env::var(INFERENCE_API_KEY_ENV)
        .ok()
        .filter(|key| is_valid_key(key));
    let toml_key = toml_config
        .inference
        .api_key
        .clone()
        .filter(|key| is_valid_key(key));

    let sources: Vec<&str> = [
        ("database", db_key.is_some()),
        ("environment", env_key.is_some()),
        ("TOML", toml_key.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, present)| present.then_some(name))
    .collect();

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "Inference API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(key) = db_key {
        info!("Inference API key loaded from database");
        return Ok(Some(key));
    }

    if let Some(key) = env_key {
        info!("Inference API key loaded from environment variable");
        return Ok(Some(key));
    }

    if let Some(key) = toml_key {
        info!("Inference API key loaded from TOML config");
        return Ok(Some(key));
    }

    info!("No inference API key configured, sending unauthenticated requests");
    Ok(None)
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Evidence policy for `analyzer`, TOML `[analysis.<type>]` over defaults
pub fn evidence_policy(toml_config: &TomlConfig, analyzer: AnalyzerType) -> EvidencePolicy {
    let default = EvidencePolicy::default_for(analyzer);
    match toml_config.analysis.get(analyzer.as_str()) {
        Some(overrides) => default.with_override(overrides),
        None => default,
    }
}

/// Warn about `[analysis.*]` sections that name no analyzer
pub fn warn_unknown_policy_sections(toml_config: &TomlConfig) {
    for name in toml_config.analysis.keys() {
        if name.parse::<AnalyzerType>().is_err() {
            warn!(section = %name, "Unknown [analysis] section in config, ignoring");
        }
    }
}

pub fn retry_policy(worker: &WorkerConfig) -> RetryPolicy {
    RetryPolicy::new(
        worker.retry_attempts,
        insight_common::time::millis_to_duration(worker.retry_delay_ms),
    )
}

pub fn scheduler_config(worker: &WorkerConfig) -> SchedulerConfig {
    let stale_threshold = Duration::try_minutes(worker.stale_lock_minutes)
        .filter(|threshold| *threshold > Duration::zero())
        .unwrap_or_else(|| {
            warn!(
                stale_lock_minutes = worker.stale_lock_minutes,
                "Unusable stale lock threshold, using default"
            );
            SchedulerConfig::default().stale_threshold
        });

    SchedulerConfig {
        stale_threshold,
        queue_warning_depth: worker.queue_warning_depth,
    }
}
