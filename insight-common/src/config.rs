//! Configuration loading and root folder resolution
//!
//! Resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never stops startup: a warning is logged
//! and compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "INSIGHT_ROOT_FOLDER";

/// Environment variable overriding the TOML config path
pub const CONFIG_PATH_ENV: &str = "INSIGHT_CONFIG";

/// File name of the database inside the root folder
pub const DATABASE_FILE_NAME: &str = "insight.db";

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set (trace/debug/info/warn/error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// External inference service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Base URL of an OpenAI-compatible completion API
    pub endpoint: String,
    /// Default model name
    pub model: String,
    /// API key (lowest priority source; see insight-ai config resolution)
    pub api_key: Option<String>,
    /// Hard timeout for one request
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llava:13b".to_string(),
            api_key: None,
            timeout_secs: 120,
            temperature: 0.4,
            max_tokens: 1500,
        }
    }
}

/// Worker loop and recovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub stale_lock_minutes: i64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// Queue depth above which enqueue logs a warning
    pub queue_warning_depth: usize,
    /// Upper bound on retrying a locked SQLite write
    pub store_max_lock_wait_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
            stale_lock_minutes: 30,
            retry_attempts: 3,
            retry_delay_ms: 2000,
            queue_warning_depth: 500,
            store_max_lock_wait_ms: 5000,
        }
    }
}

/// Longest accepted `stale_lock_minutes` (one week)
pub const MAX_STALE_LOCK_MINUTES: i64 = 7 * 24 * 60;

impl WorkerConfig {
    /// Replace values the worker cannot run with by their defaults
    ///
    /// A zero poll interval would stall the timer and an out-of-range stale
    /// threshold cannot be represented as a duration; both are logged.
    pub fn sanitize(&mut self) {
        let defaults = WorkerConfig::default();

        if self.poll_interval_ms == 0 {
            warn!(
                default = defaults.poll_interval_ms,
                "worker.poll_interval_ms must be positive - using default"
            );
            self.poll_interval_ms = defaults.poll_interval_ms;
        }

        if !(1..=MAX_STALE_LOCK_MINUTES).contains(&self.stale_lock_minutes) {
            warn!(
                value = self.stale_lock_minutes,
                max = MAX_STALE_LOCK_MINUTES,
                default = defaults.stale_lock_minutes,
                "worker.stale_lock_minutes out of range - using default"
            );
            self.stale_lock_minutes = defaults.stale_lock_minutes;
        }
    }
}

/// Per-analyzer evidence policy override; unset fields keep compiled defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverride {
    pub min_evidence: Option<usize>,
    pub reliable_evidence: Option<usize>,
    pub penalty: Option<u8>,
    pub floor: Option<u8>,
}

/// Complete TOML configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub inference: InferenceConfig,
    pub worker: WorkerConfig,
    /// Keyed by analyzer name ("vision", "document", "trait", "emotion", "report")
    pub analysis: BTreeMap<String, PolicyOverride>,
}

/// Default location of the TOML config file for this platform
///
/// `~/.config/insight/insight.toml` on Linux, the platform config dir elsewhere.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("insight").join("insight.toml"))
}

/// Resolve the config file path: explicit → env → platform default
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    default_config_path()
}

/// Load a TOML config file, falling back to defaults
///
/// Missing file: debug log + defaults. Unreadable or malformed file: warning
/// + defaults.
pub fn load_toml_config(path: &Path) -> TomlConfig {
    if !path.exists() {
        debug!("Config file not found at {}, using defaults", path.display());
        return TomlConfig::default();
    }

    match read_toml_config(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{} - using default configuration", e);
            TomlConfig::default()
        }
    }
}

/// Read and parse a TOML config file, reporting failures
///
/// Worker values that cannot be run with are reset to defaults.
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let mut config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;
    config.worker.sanitize();
    Ok(config)
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Root folder resolution (CLI → ENV → TOML → OS default)
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, toml_config: &TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_root: toml_config.root_folder.clone(),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        // Priority 4: OS-dependent compiled default
        default_root_folder()
    }
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/insight (or /var/lib/insight for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("insight"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/insight"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("insight"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/insight"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("insight"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\insight"))
    } else {
        PathBuf::from("./insight_data")
    }
}

/// Ensures the root folder exists and locates files inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = TomlConfig::default();
        assert_eq!(config.worker.poll_interval_ms, 3000);
        assert_eq!(config.worker.stale_lock_minutes, 30);
        assert_eq!(config.worker.retry_attempts, 3);
        assert_eq!(config.worker.retry_delay_ms, 2000);
        assert_eq!(config.inference.timeout_secs, 120);
        assert_eq!(config.logging.level, "info");
        assert!(config.analysis.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [worker]
            poll_interval_ms = 500

            [analysis.trait]
            penalty = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.worker.poll_interval_ms, 500);
        assert_eq!(config.worker.retry_attempts, 3);
        let trait_override = config.analysis.get("trait").unwrap();
        assert_eq!(trait_override.penalty, Some(25));
        assert_eq!(trait_override.min_evidence, None);
    }

    #[test]
    fn test_database_path_inside_root() {
        let init = RootFolderInitializer::new(PathBuf::from("/tmp/insight-root"));
        assert_eq!(
            init.database_path(),
            PathBuf::from("/tmp/insight-root").join(DATABASE_FILE_NAME)
        );
    }
}
