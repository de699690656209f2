//! Single-attempt stage execution.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::StageDescriptor;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::core::{ExecutionRecord, PipelineState, RunId};
use crate::errors::{StageFailure, TransientServiceError, ValidationError};
use crate::generation::{GenerationError, GenerationRequest, GenerationService};

/// Runs one attempt of one stage.
///
/// Exactly one generation call per invocation; retrying is the caller's job.
/// On success the checkpoint is durable before this returns.
#[derive(Clone)]
pub struct StageExecutor {
    generator: Arc<dyn GenerationService>,
    store: Arc<dyn CheckpointStore>,
}

impl std::fmt::Debug for StageExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutor").finish_non_exhaustive()
    }
}

impl StageExecutor {
    /// Creates an executor over the given collaborators.
    #[must_use]
    pub fn new(generator: Arc<dyn GenerationService>, store: Arc<dyn CheckpointStore>) -> Self {
        Self { generator, store }
    }

    /// Returns the checkpoint store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Executes `stage` against `state`.
    ///
    /// Returns the state with the stage's output field assigned, plus the
    /// execution record for `attempt`. Missing inputs and malformed prompts
    /// fail before the generation service is called. Service errors and
    /// blank responses are retryable; checkpoint write failures are not.
    pub async fn execute(
        &self,
        run_id: &RunId,
        stage: &StageDescriptor,
        state: &PipelineState,
        attempt: u32,
    ) -> Result<(PipelineState, ExecutionRecord), StageFailure> {
        if let Some(field) = stage.input_fields.iter().find(|field| !state.has(**field)) {
            return Err(ValidationError::missing_input(&stage.name, field.as_str()).into());
        }
        let prompt = stage.prompt.render(&stage.name, state)?;
        let input_length: usize = stage
            .input_fields
            .iter()
            .map(|field| state.output_length(*field))
            .sum();

        let request = GenerationRequest::new(&stage.name, &stage.prompt.system, prompt)
            .with_context(serde_json::json!({
                "run_id": run_id.as_str(),
                "attempt": attempt,
                "output_field": stage.output_field,
            }));

        debug!(run_id = %run_id, stage = %stage.name, attempt, "Calling generation service");
        let started = Instant::now();
        let output = self
            .generator
            .generate(request)
            .await
            .map_err(|e| TransientServiceError::new(&stage.name, e))?;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        if output.trim().is_empty() {
            return Err(TransientServiceError::new(
                &stage.name,
                GenerationError::invalid_response("generation service returned an empty response"),
            )
            .into());
        }

        let new_state = state.clone().with(stage.output_field, output);
        let output_length = new_state.output_length(stage.output_field);

        let checkpoint = Checkpoint::new(
            run_id.clone(),
            &stage.name,
            stage.output_field,
            &new_state,
        );
        self.store.put(checkpoint).await?;

        info!(
            run_id = %run_id,
            stage = %stage.name,
            attempt,
            input_length,
            output_length,
            duration_ms,
            "Stage completed"
        );

        let record = ExecutionRecord::succeeded(&stage.name, attempt, duration_ms, output_length);
        Ok((new_state, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpointStore;
    use crate::core::StateField;
    use crate::errors::{CheckpointStoreError, PipelineError};
    use crate::generation::GenerationErrorKind;
    use crate::stages::StageRegistry;
    use crate::testing::{ScriptedGenerationService, ScriptedOutcome};
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        Store {}

        #[async_trait]
        impl CheckpointStore for Store {
            async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointStoreError>;
            async fn get(
                &self,
                run_id: &RunId,
                stage_name: &str,
            ) -> Result<Option<Checkpoint>, CheckpointStoreError>;
            async fn delete(&self, run_id: &RunId, stage_name: &str) -> Result<bool, CheckpointStoreError>;
            async fn list_stages(&self, run_id: &RunId) -> Result<Vec<String>, CheckpointStoreError>;
        }
    }

    mock! {
        Generator {}

        #[async_trait]
        impl GenerationService for Generator {
            async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
        }
    }

    fn run_id() -> RunId {
        RunId::new("exec-run").unwrap()
    }

    #[tokio::test]
    async fn test_success_writes_checkpoint_and_record() {
        let registry = StageRegistry::without_summary();
        let generator = Arc::new(
            ScriptedGenerationService::new().respond("specify", "Feature list: cart, checkout"),
        );
        let store = Arc::new(InMemoryCheckpointStore::new());
        let executor = StageExecutor::new(generator.clone(), store.clone());
        let state = PipelineState::new("online shop");

        let (next, record) = executor
            .execute(&run_id(), registry.get("specify").unwrap(), &state, 1)
            .await
            .unwrap();

        assert_eq!(next.get(StateField::Specification), Some("Feature list: cart, checkout"));
        assert_eq!(next.get(StateField::Input), Some("online shop"));
        assert_eq!(record.attempt_count, 1);
        assert_eq!(record.output_length, "Feature list: cart, checkout".len());

        let checkpoint = store.get(&run_id(), "specify").await.unwrap().unwrap();
        assert_eq!(checkpoint.output(), Some("Feature list: cart, checkout"));

        let calls = generator.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].prompt.contains("online shop"));
    }

    #[tokio::test]
    async fn test_request_carries_system_prompt_and_context() {
        let registry = StageRegistry::without_summary();
        let stage = registry.get("review").unwrap();
        let expected_system = stage.prompt.system.clone();

        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .withf(move |request| {
                let context = request.context.clone().unwrap_or_default();
                request.stage == "review"
                    && request.system_prompt == expected_system
                    && request.prompt.contains("<main>draft</main>")
                    && context["run_id"] == "exec-run"
                    && context["attempt"] == 2
                    && context["output_field"] == "reviewed"
            })
            .times(1)
            .returning(|_| Ok("<main>fixed</main>".to_string()));

        let executor = StageExecutor::new(Arc::new(generator), Arc::new(InMemoryCheckpointStore::new()));
        let state = PipelineState::new("x").with(StateField::Generated, "<main>draft</main>");

        let (next, record) = executor.execute(&run_id(), stage, &state, 2).await.unwrap();
        assert_eq!(next.get(StateField::Reviewed), Some("<main>fixed</main>"));
        assert_eq!(record.attempt_count, 2);
    }

    #[tokio::test]
    async fn test_missing_input_short_circuits() {
        let registry = StageRegistry::without_summary();
        let generator = Arc::new(ScriptedGenerationService::new());
        let store = Arc::new(InMemoryCheckpointStore::new());
        let executor = StageExecutor::new(generator.clone(), store.clone());

        let err = executor
            .execute(&run_id(), registry.get("generate").unwrap(), &PipelineState::new("x"), 1)
            .await
            .unwrap_err();

        match err {
            StageFailure::Fatal(PipelineError::Validation(err)) => {
                assert_eq!(err.stage, "generate");
                assert_eq!(err.field.as_deref(), Some("specification"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert_eq!(generator.call_count(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_service_error_is_retryable() {
        let registry = StageRegistry::without_summary();
        let generator = Arc::new(ScriptedGenerationService::new().script(
            "specify",
            [ScriptedOutcome::Fail(GenerationError::rate_limited("slow down"))],
        ));
        let store = Arc::new(InMemoryCheckpointStore::new());
        let executor = StageExecutor::new(generator, store.clone());

        let err = executor
            .execute(&run_id(), registry.get("specify").unwrap(), &PipelineState::new("x"), 1)
            .await
            .unwrap_err();

        match err {
            StageFailure::Retryable(err) => {
                assert_eq!(err.stage, "specify");
                assert_eq!(err.source.kind, GenerationErrorKind::RateLimited);
            }
            other => panic!("expected retryable failure, got {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_blank_response_is_invalid() {
        let registry = StageRegistry::without_summary();
        let generator = Arc::new(ScriptedGenerationService::new().respond("specify", "  \n"));
        let executor = StageExecutor::new(generator, Arc::new(InMemoryCheckpointStore::new()));

        let err = executor
            .execute(&run_id(), registry.get("specify").unwrap(), &PipelineState::new("x"), 2)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StageFailure::Retryable(ref e) if e.source.kind == GenerationErrorKind::InvalidResponse
        ));
    }

    #[tokio::test]
    async fn test_unavailable_store_is_fatal() {
        let registry = StageRegistry::without_summary();
        let mut store = MockStore::new();
        store
            .expect_put()
            .times(1)
            .returning(|_| Err(CheckpointStoreError::Unavailable("disk full".to_string())));
        let executor = StageExecutor::new(
            Arc::new(ScriptedGenerationService::new()),
            Arc::new(store),
        );

        let err = executor
            .execute(&run_id(), registry.get("specify").unwrap(), &PipelineState::new("x"), 1)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StageFailure::Fatal(PipelineError::Checkpoint(CheckpointStoreError::Unavailable(_)))
        ));
    }
}
