//! Engine configuration.
//!
//! Every field has a serde default, so a partial JSON file or an empty
//! environment yields a usable config. Environment variables use the
//! `GENFLOW_` prefix and are read after loading a `.env` file if present.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::checkpoint::{CheckpointStore, FileCheckpointStore};
use crate::errors::ConfigError;
use crate::observability::LogFormat;
use crate::pipeline::RetryConfig;
use crate::report::{FileReportSink, ReportSink};

/// Checkpoint root directory.
pub const ENV_CHECKPOINT_DIR: &str = "GENFLOW_CHECKPOINT_DIR";
/// Report root directory.
pub const ENV_REPORT_DIR: &str = "GENFLOW_REPORT_DIR";
/// Attempts per stage.
pub const ENV_MAX_ATTEMPTS: &str = "GENFLOW_MAX_ATTEMPTS";
/// Backoff base.
pub const ENV_BASE_DELAY: &str = "GENFLOW_BASE_DELAY";
/// Length of one backoff unit in milliseconds.
pub const ENV_TIME_UNIT_MS: &str = "GENFLOW_TIME_UNIT_MS";
/// Log output format.
pub const ENV_LOG_FORMAT: &str = "GENFLOW_LOG_FORMAT";
/// Chat completions endpoint.
pub const ENV_ENDPOINT: &str = "GENFLOW_ENDPOINT";
/// Model name.
pub const ENV_MODEL: &str = "GENFLOW_MODEL";
/// Bearer token for the endpoint.
pub const ENV_API_KEY: &str = "GENFLOW_API_KEY";
/// Sampling temperature.
pub const ENV_TEMPERATURE: &str = "GENFLOW_TEMPERATURE";
/// Completion token limit.
pub const ENV_MAX_TOKENS: &str = "GENFLOW_MAX_TOKENS";
/// Per-request timeout in seconds.
pub const ENV_TIMEOUT_SECONDS: &str = "GENFLOW_TIMEOUT_SECONDS";

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from(".genflow/checkpoints")
}

fn default_report_dir() -> PathBuf {
    PathBuf::from(".genflow/reports")
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

/// Settings for the HTTP generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// OpenAI-compatible chat completions URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model name sent with each request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Bearer token. Never serialized.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,
    /// Completion token limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            temperature: 0.0,
            max_tokens: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl GenerationConfig {
    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenflowConfig {
    /// Root of the file checkpoint store.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    /// Root of the file report sink.
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    /// Retry behavior.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Generation backend.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GenflowConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            report_dir: default_report_dir(),
            retry: RetryConfig::default(),
            generation: GenerationConfig::default(),
            log_format: LogFormat::default(),
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::invalid(key, format!("'{raw}': {e}")))
}

impl GenflowConfig {
    /// Loads `.env` if present, then reads `GENFLOW_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = get(ENV_CHECKPOINT_DIR) {
            config.checkpoint_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(ENV_REPORT_DIR) {
            config.report_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get(ENV_MAX_ATTEMPTS) {
            config.retry.max_attempts = parse(ENV_MAX_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = get(ENV_BASE_DELAY) {
            config.retry.base_delay = parse(ENV_BASE_DELAY, &raw)?;
        }
        if let Some(raw) = get(ENV_TIME_UNIT_MS) {
            config.retry.time_unit_ms = parse(ENV_TIME_UNIT_MS, &raw)?;
        }
        if let Some(raw) = get(ENV_LOG_FORMAT) {
            config.log_format = parse(ENV_LOG_FORMAT, &raw)?;
        }
        if let Some(endpoint) = get(ENV_ENDPOINT) {
            config.generation.endpoint = endpoint;
        }
        if let Some(model) = get(ENV_MODEL) {
            config.generation.model = model;
        }
        if let Some(key) = get(ENV_API_KEY) {
            config.generation.api_key = Some(key);
        }
        if let Some(raw) = get(ENV_TEMPERATURE) {
            config.generation.temperature = parse(ENV_TEMPERATURE, &raw)?;
        }
        if let Some(raw) = get(ENV_MAX_TOKENS) {
            config.generation.max_tokens = Some(parse(ENV_MAX_TOKENS, &raw)?);
        }
        if let Some(raw) = get(ENV_TIMEOUT_SECONDS) {
            config.generation.timeout_seconds = parse(ENV_TIMEOUT_SECONDS, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        if self.generation.timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "generation.timeout_seconds",
                "must be at least 1",
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::invalid(
                "generation.temperature",
                format!("must be between 0 and 2, got {}", self.generation.temperature),
            ));
        }
        Ok(())
    }

    /// A file checkpoint store rooted at `checkpoint_dir`.
    #[must_use]
    pub fn checkpoint_store(&self) -> Arc<dyn CheckpointStore> {
        Arc::new(FileCheckpointStore::new(&self.checkpoint_dir))
    }

    /// A file report sink rooted at `report_dir`.
    #[must_use]
    pub fn report_sink(&self) -> Arc<dyn ReportSink> {
        Arc::new(FileReportSink::new(&self.report_dir))
    }
}
