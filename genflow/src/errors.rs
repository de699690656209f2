//! Error types for the genflow pipeline engine.
//!
//! The taxonomy separates failures by how the engine reacts to them:
//!
//! - [`ValidationError`]: a stage precondition is not met; never retried.
//! - [`TransientServiceError`]: the generation service failed; retried with backoff.
//! - [`FatalPipelineError`]: retries are exhausted; the run is aborted.
//! - [`CheckpointCorruptionError`]: a persisted snapshot is unusable; handled
//!   locally by re-executing the stage.
//!
//! [`StageFailure`] is the tagged outcome a stage execution reports to the
//! retry controller, so the retry-or-abort decision is a plain `match`.

use crate::generation::GenerationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Top-level error returned by the pipeline entry points.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage's required input was missing or its request was malformed.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A stage exhausted its retry budget.
    #[error("{0}")]
    Fatal(#[from] FatalPipelineError),

    /// The checkpoint store could not be reached.
    #[error("{0}")]
    Checkpoint(#[from] CheckpointStoreError),

    /// The stage chain or engine configuration is malformed.
    #[error("{0}")]
    InvalidChain(#[from] PipelineValidationError),

    /// A stage name that is not part of the registry was requested.
    #[error("Unknown stage: '{0}'")]
    UnknownStage(String),

    /// The engine configuration is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Returns the stage the error is attributed to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Validation(err) => Some(&err.stage),
            Self::Fatal(err) => Some(&err.stage),
            Self::Checkpoint(CheckpointStoreError::Corrupted(err)) => Some(&err.stage),
            Self::UnknownStage(stage) => Some(stage),
            Self::Checkpoint(_) | Self::InvalidChain(_) | Self::Config(_) => None,
        }
    }

    /// Returns the number of attempts made before the error, if known.
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Fatal(err) => Some(err.attempts),
            _ => None,
        }
    }

    /// Returns true if the error was raised by a stage precondition check.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if the error is a retry-exhaustion failure.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Outcome of a single failed stage execution.
///
/// Only [`StageFailure::Retryable`] is eligible for another attempt.
#[derive(Debug)]
pub enum StageFailure {
    /// The generation service failed in a way presumed recoverable.
    Retryable(TransientServiceError),
    /// The failure must terminate the run without retrying.
    Fatal(PipelineError),
}

impl StageFailure {
    /// Returns true if the failure may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

impl From<ValidationError> for StageFailure {
    fn from(err: ValidationError) -> Self {
        Self::Fatal(PipelineError::Validation(err))
    }
}

impl From<CheckpointStoreError> for StageFailure {
    fn from(err: CheckpointStoreError) -> Self {
        Self::Fatal(PipelineError::Checkpoint(err))
    }
}

impl From<TransientServiceError> for StageFailure {
    fn from(err: TransientServiceError) -> Self {
        Self::Retryable(err)
    }
}

/// A stage precondition failed before the generation service was called.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation failed for stage '{stage}': {message}")]
pub struct ValidationError {
    /// The stage whose precondition failed.
    pub stage: String,
    /// The missing or offending field, when one is known.
    pub field: Option<String>,
    /// Description of the failure.
    pub message: String,
}

impl ValidationError {
    /// Creates an error for a required input that is absent or empty.
    #[must_use]
    pub fn missing_input(stage: impl Into<String>, field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            stage: stage.into(),
            message: format!("required input '{field}' is missing or empty"),
            field: Some(field),
        }
    }

    /// Creates an error for a request that cannot be dispatched as built.
    #[must_use]
    pub fn malformed_request(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            field: None,
            message: message.into(),
        }
    }
}

/// The generation service failed while executing a stage.
#[derive(Debug, Clone, Error)]
#[error("Transient failure in stage '{stage}': {source}")]
pub struct TransientServiceError {
    /// The stage being executed.
    pub stage: String,
    /// The underlying service error.
    pub source: GenerationError,
}

impl TransientServiceError {
    /// Creates a new transient service error.
    #[must_use]
    pub fn new(stage: impl Into<String>, source: GenerationError) -> Self {
        Self {
            stage: stage.into(),
            source,
        }
    }
}

/// A stage exhausted its retry budget; the run is aborted.
#[derive(Debug, Clone, Error)]
#[error("Pipeline failed at stage '{stage}' after {attempts} attempt(s): {}", .last_error.source)]
pub struct FatalPipelineError {
    /// The failing stage.
    pub stage: String,
    /// Number of attempts made, including the first.
    pub attempts: u32,
    /// The error raised by the final attempt.
    #[source]
    pub last_error: TransientServiceError,
}

impl FatalPipelineError {
    /// Creates a new fatal pipeline error.
    #[must_use]
    pub fn new(stage: impl Into<String>, attempts: u32, last_error: TransientServiceError) -> Self {
        Self {
            stage: stage.into(),
            attempts,
            last_error,
        }
    }
}

/// A persisted checkpoint cannot be used to skip its stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Corrupted checkpoint for run '{run_id}', stage '{stage}': {reason}")]
pub struct CheckpointCorruptionError {
    /// The run the checkpoint belongs to.
    pub run_id: String,
    /// The stage the checkpoint belongs to.
    pub stage: String,
    /// Why the checkpoint was rejected.
    pub reason: String,
}

impl CheckpointCorruptionError {
    /// Creates a new corruption error.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        stage: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by checkpoint store backends.
#[derive(Debug, Error)]
pub enum CheckpointStoreError {
    /// The store could not be reached at all.
    #[error("Checkpoint store unavailable: {0}")]
    Unavailable(String),

    /// An I/O operation against the store failed.
    #[error("Checkpoint store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A checkpoint could not be encoded.
    #[error("Checkpoint serialization error: {0}")]
    Serialization(String),

    /// A stored checkpoint exists but cannot be used.
    #[error("{0}")]
    Corrupted(#[from] CheckpointCorruptionError),
}

/// Errors raised while persisting the final report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Writing the report failed.
    #[error("Report I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The report could not be encoded.
    #[error("Report serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The background write task failed.
    #[error("Report write task failed: {0}")]
    Task(String),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting holds a value outside its accepted range.
    #[error("Invalid value for '{key}': {message}")]
    Invalid {
        /// The offending setting.
        key: String,
        /// Why the value was rejected.
        message: String,
    },

    /// The configuration file could not be read.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for the schema.
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Metadata about a chain-validation error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a stage chain or engine configuration is rejected.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when stage predecessor links form a cycle.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in stage chain: {}", .cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "CONTRACT-004-CYCLE",
            format!("Stage chain contains a cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Every stage must be reachable from the first stage by predecessor links.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            stages: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}
