//! Bounded retry with configurable backoff.
//!
//! The controller wraps a single stage execution. Only
//! [`StageFailure::Retryable`] outcomes are retried; anything else is
//! returned to the engine untouched. The loop is iterative, so the attempt
//! counter is explicit and the stack depth does not grow with retries.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};

use crate::core::{ExecutionRecord, PipelineState, RunContext};
use crate::errors::{ConfigError, FatalPipelineError, PipelineError, StageFailure};
use crate::events::{EventSink, STAGE_RETRY};
use crate::stages::{StageDescriptor, StageExecutor};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = unit * base^attempt
    #[default]
    Exponential,
    /// delay = unit * base * attempt
    Linear,
    /// delay = unit * base
    Constant,
}

/// Jitter applied on top of the computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Adds up to half the delay; never shortens it.
    Additive,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> f64 {
    2.0
}

fn default_time_unit_ms() -> u64 {
    1000
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per stage, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base of the backoff curve, in time units.
    #[serde(default = "default_base_delay")]
    pub base_delay: f64,
    /// Length of one time unit in milliseconds.
    #[serde(default = "default_time_unit_ms")]
    pub time_unit_ms: u64,
    /// Optional cap on a single delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            time_unit_ms: default_time_unit_ms(),
            max_delay_ms: None,
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the backoff base.
    #[must_use]
    pub fn with_base_delay(mut self, base: f64) -> Self {
        self.base_delay = base;
        self
    }

    /// Sets the length of one time unit.
    #[must_use]
    pub fn with_time_unit_ms(mut self, unit: u64) -> Self {
        self.time_unit_ms = unit;
        self
    }

    /// Caps every delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = Some(delay);
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Checks that the config can drive a retry loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "retry.max_attempts",
                "must be at least 1",
            ));
        }
        if !self.base_delay.is_finite() || self.base_delay < 1.0 {
            return Err(ConfigError::invalid(
                "retry.base_delay",
                format!("must be a finite number >= 1, got {}", self.base_delay),
            ));
        }
        Ok(())
    }

    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let units = match self.backoff {
            BackoffStrategy::Exponential => {
                self.base_delay.powi(i32::try_from(attempt).unwrap_or(i32::MAX))
            }
            BackoffStrategy::Linear => self.base_delay * f64::from(attempt),
            BackoffStrategy::Constant => self.base_delay,
        };

        // Float to int casts saturate, so huge or non-finite values clamp.
        let mut millis = (units * self.time_unit_ms as f64) as u64;
        if let Some(cap) = self.max_delay_ms {
            millis = millis.min(cap);
        }

        let jittered = match self.jitter {
            JitterStrategy::None => millis,
            JitterStrategy::Additive => {
                let half = millis / 2;
                if half == 0 {
                    millis
                } else {
                    millis.saturating_add(rand::thread_rng().gen_range(0..=half))
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Runs stages under a [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetryController {
    config: RetryConfig,
}

impl RetryController {
    /// Creates a controller.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the config in use.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Executes a stage, retrying transient failures with backoff.
    ///
    /// Every transient failure increments the run's error count. Once
    /// `max_attempts` is reached the last failure is wrapped in a
    /// [`FatalPipelineError`]. Fatal stage failures pass through on the
    /// first occurrence. No delay follows the final attempt.
    pub async fn run_with_retry(
        &self,
        executor: &StageExecutor,
        ctx: &mut RunContext,
        stage: &StageDescriptor,
        state: &PipelineState,
        events: &dyn EventSink,
    ) -> Result<(PipelineState, ExecutionRecord), PipelineError> {
        let max_attempts = self.config.max_attempts.max(1);
        let run_id = ctx.run_id().clone();
        let mut attempt = 1;

        loop {
            match executor.execute(&run_id, stage, state, attempt).await {
                Ok(outcome) => return Ok(outcome),
                Err(StageFailure::Fatal(err)) => return Err(err),
                Err(StageFailure::Retryable(err)) => {
                    ctx.record_error();

                    if attempt >= max_attempts {
                        error!(
                            run_id = %run_id,
                            stage = %stage.name,
                            attempts = attempt,
                            error = %err,
                            "Retries exhausted"
                        );
                        return Err(FatalPipelineError::new(&stage.name, attempt, err).into());
                    }

                    let delay = self.config.delay_for_attempt(attempt);
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    warn!(
                        run_id = %run_id,
                        stage = %stage.name,
                        attempt,
                        delay_ms,
                        error = %err,
                        "Stage attempt failed, retrying"
                    );
                    events
                        .emit(
                            STAGE_RETRY,
                            Some(serde_json::json!({
                                "run_id": run_id.as_str(),
                                "stage": stage.name,
                                "attempt": attempt,
                                "delay_ms": delay_ms,
                                "error_kind": err.source.kind,
                                "error": err.to_string(),
                            })),
                        )
                        .await;

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpointStore;
    use crate::core::{RunId, StateField};
    use crate::events::CollectingEventSink;
    use crate::stages::StageRegistry;
    use crate::testing::ScriptedGenerationService;
    use std::sync::Arc;
    use std::time::Instant;

    fn fast() -> RetryConfig {
        RetryConfig::new().with_time_unit_ms(1)
    }

    fn executor(generator: Arc<ScriptedGenerationService>) -> StageExecutor {
        StageExecutor::new(generator, Arc::new(InMemoryCheckpointStore::new()))
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert!((config.base_delay - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.time_unit_ms, 1000);
        assert_eq!(config.backoff, BackoffStrategy::Exponential);
        assert_eq!(config.jitter, JitterStrategy::None);
    }

    #[test]
    fn test_exponential_delays() {
        let config = RetryConfig::new();
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_linear_and_constant_delays() {
        let linear = RetryConfig::new()
            .with_time_unit_ms(10)
            .with_backoff(BackoffStrategy::Linear);
        assert_eq!(linear.delay_for_attempt(3), Duration::from_millis(60));

        let constant = linear.with_backoff(BackoffStrategy::Constant);
        assert_eq!(constant.delay_for_attempt(5), Duration::from_millis(20));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig::new().with_max_delay_ms(5000);
        assert_eq!(config.delay_for_attempt(10), Duration::from_millis(5000));
    }

    #[test]
    fn test_additive_jitter_never_shortens() {
        let config = RetryConfig::new()
            .with_time_unit_ms(100)
            .with_jitter(JitterStrategy::Additive);

        for _ in 0..20 {
            let delay = config.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(300));
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(RetryConfig::new().validate().is_ok());
        assert!(RetryConfig::new().with_max_attempts(0).validate().is_err());
        assert!(RetryConfig::new().with_base_delay(0.5).validate().is_err());
        assert!(RetryConfig::new().with_base_delay(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_attempts": 5, "backoff": "linear"}"#).unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.time_unit_ms, 1000);
        assert_eq!(config.backoff, BackoffStrategy::Linear);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let registry = StageRegistry::without_summary();
        let stage = registry.get("specify").unwrap();
        let generator = Arc::new(ScriptedGenerationService::new().fail_times(&stage.name, 2));
        let exec = executor(generator.clone());
        let events = CollectingEventSink::new();
        let mut ctx = RunContext::new(RunId::generate());

        let (state, record) = RetryController::new(fast())
            .run_with_retry(&exec, &mut ctx, stage, &PipelineState::new("todo app"), &events)
            .await
            .unwrap();

        assert_eq!(record.attempt_count, 3);
        assert!(record.success);
        assert!(state.has(StateField::Specification));
        assert_eq!(ctx.error_count(), 2);
        assert_eq!(generator.call_count(), 3);
        assert_eq!(events.events_of_type("stage.retry").len(), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_is_fatal() {
        let registry = StageRegistry::without_summary();
        let stage = registry.get("specify").unwrap();
        let generator = Arc::new(ScriptedGenerationService::new().always_fail(&stage.name));
        let exec = executor(generator.clone());
        let mut ctx = RunContext::new(RunId::generate());
        let config = RetryConfig::new().with_time_unit_ms(10);

        let started = Instant::now();
        let err = RetryController::new(config)
            .run_with_retry(
                &exec,
                &mut ctx,
                stage,
                &PipelineState::new("todo app"),
                &crate::events::NoOpEventSink,
            )
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(err.stage(), Some(stage.name.as_str()));
        assert_eq!(err.attempts(), Some(3));
        assert_eq!(ctx.error_count(), 3);
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_validation_failure_is_not_retried() {
        let registry = StageRegistry::without_summary();
        let stage = registry.get("generate").unwrap();
        let generator = Arc::new(ScriptedGenerationService::new());
        let exec = executor(generator.clone());
        let mut ctx = RunContext::new(RunId::generate());

        let err = RetryController::new(fast())
            .run_with_retry(
                &exec,
                &mut ctx,
                stage,
                &PipelineState::new("todo app"),
                &crate::events::NoOpEventSink,
            )
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(generator.call_count(), 0);
        assert_eq!(ctx.error_count(), 0);
    }
}
