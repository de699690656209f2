//! The pipeline engine.
//!
//! Drives the stage chain for one run: restore from checkpoint where a valid
//! one exists, otherwise execute under the retry controller. The engine
//! holds no per-run state, so one instance can serve many run ids at once.

use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

use super::retry::RetryController;
use crate::checkpoint::{load_valid, CheckpointStore};
use crate::core::{ExecutionRecord, PipelineState, RunContext, RunId, StageStatus, StateField};
use crate::errors::PipelineError;
use crate::events::{
    EventSink, PIPELINE_COMPLETED, PIPELINE_FAILED, PIPELINE_STARTED, STAGE_COMPLETED,
    STAGE_FAILED, STAGE_SKIPPED, STAGE_STARTED,
};
use crate::observability::SpanTimer;
use crate::report::{build_report, Report, ReportSink};
use crate::stages::{StageExecutor, StageRegistry};

/// Executes the stage chain with checkpointing and bounded retry.
pub struct PipelineEngine {
    registry: Arc<StageRegistry>,
    executor: StageExecutor,
    retry: RetryController,
    reports: Arc<dyn ReportSink>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PipelineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineEngine")
            .field("stages", &self.registry.names())
            .field("retry", self.retry.config())
            .finish_non_exhaustive()
    }
}

impl PipelineEngine {
    pub(crate) fn new(
        registry: StageRegistry,
        executor: StageExecutor,
        retry: RetryController,
        reports: Arc<dyn ReportSink>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            executor,
            retry,
            reports,
            events,
        }
    }

    /// Returns the stage chain.
    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Returns the checkpoint store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        self.executor.store()
    }

    /// Runs the chain for `run_id` starting from `initial`.
    ///
    /// Existing valid checkpoints are honored, so calling `start` again for
    /// the same run after a crash continues where it stopped.
    pub async fn start(
        &self,
        run_id: RunId,
        initial: PipelineState,
    ) -> Result<Report, PipelineError> {
        let mut ctx = RunContext::new(run_id);
        let state = self.run(&mut ctx, initial).await?;
        Ok(self.finish(&ctx, &state).await)
    }

    /// Continues a run from its checkpoints.
    ///
    /// The state, including the original input, is rebuilt from the
    /// checkpoints. A run without any checkpoint starts from an empty state
    /// and fails on the first stage's missing input.
    pub async fn resume(&self, run_id: RunId) -> Result<Report, PipelineError> {
        let existing = self.store().list_stages(&run_id).await?;
        if existing.is_empty() {
            warn!(run_id = %run_id, "Resume requested but no checkpoints exist");
        } else {
            info!(run_id = %run_id, checkpoints = existing.len(), "Resuming run");
        }
        self.start(run_id, PipelineState::default()).await
    }

    /// Discards the checkpoints of `stage` and every later stage, then
    /// resumes, so those stages execute again.
    ///
    /// The run's input is recovered from the earliest valid checkpoint
    /// before anything is deleted.
    pub async fn rerun_from(&self, run_id: RunId, stage: &str) -> Result<Report, PipelineError> {
        let position = self
            .registry
            .position(stage)
            .ok_or_else(|| PipelineError::UnknownStage(stage.to_string()))?;

        let mut initial = PipelineState::default();
        for descriptor in self.registry.iter() {
            if let Some(checkpoint) = load_valid(self.store().as_ref(), &run_id, descriptor).await? {
                if let Some(input) = checkpoint.state_snapshot.get(StateField::Input.as_str()) {
                    initial.set(StateField::Input, input.clone());
                    break;
                }
            }
        }

        for descriptor in self.registry.iter().skip(position) {
            if self.store().delete(&run_id, &descriptor.name).await? {
                info!(run_id = %run_id, stage = %descriptor.name, "Discarded checkpoint for re-run");
            }
        }

        self.start(run_id, initial).await
    }

    /// Drives every stage in order, recording into `ctx`.
    ///
    /// Returns the final state. Stages are restored from checkpoints up to
    /// the first one that must execute; from there on every stage executes
    /// and overwrites its checkpoint. The first fatal or validation failure
    /// stops the run; later stages are left pending.
    pub async fn run(
        &self,
        ctx: &mut RunContext,
        initial: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        let run_id = ctx.run_id().clone();
        let span = info_span!("pipeline_run", run_id = %run_id);

        self.events
            .emit(
                PIPELINE_STARTED,
                Some(serde_json::json!({
                    "run_id": run_id.as_str(),
                    "stages": self.registry.names(),
                })),
            )
            .await;

        let result = self.drive(ctx, initial).instrument(span).await;

        match &result {
            Ok(_) => {
                self.events
                    .emit(
                        PIPELINE_COMPLETED,
                        Some(serde_json::json!({
                            "run_id": run_id.as_str(),
                            "stages_completed": ctx.stages_completed(),
                            "error_count": ctx.error_count(),
                        })),
                    )
                    .await;
            }
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "Pipeline failed");
                self.events
                    .emit(
                        PIPELINE_FAILED,
                        Some(serde_json::json!({
                            "run_id": run_id.as_str(),
                            "stage": err.stage(),
                            "attempts": err.attempts(),
                            "error": err.to_string(),
                        })),
                    )
                    .await;
            }
        }

        result
    }

    async fn drive(
        &self,
        ctx: &mut RunContext,
        initial: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        let run_id = ctx.run_id().clone();
        ctx.track_stages(self.registry.names());
        let mut state = initial;
        // Once a stage executes, later checkpoints derive from stale inputs.
        let mut restoring = true;

        for stage in self.registry.iter() {
            let timer = SpanTimer::start(&stage.name);

            let restored = if restoring {
                load_valid(self.store().as_ref(), &run_id, stage).await?
            } else {
                None
            };
            if let Some(checkpoint) = restored {
                state.merge_checkpoint(&checkpoint.state_snapshot, stage.output_field);
                let output_length = state.output_length(stage.output_field);
                let record = ExecutionRecord::resumed(&stage.name, timer.finish(), output_length);
                ctx.complete_stage(record, StageStatus::Skipped);

                info!(run_id = %run_id, stage = %stage.name, output_length, "Restored stage from checkpoint");
                self.events
                    .emit(
                        STAGE_SKIPPED,
                        Some(serde_json::json!({
                            "run_id": run_id.as_str(),
                            "stage": stage.name,
                            "checkpoint_timestamp": checkpoint.timestamp,
                        })),
                    )
                    .await;
                continue;
            }
            restoring = false;

            self.events
                .emit(
                    STAGE_STARTED,
                    Some(serde_json::json!({
                        "run_id": run_id.as_str(),
                        "stage": stage.name,
                    })),
                )
                .await;

            match self
                .retry
                .run_with_retry(&self.executor, ctx, stage, &state, self.events.as_ref())
                .await
            {
                Ok((next, record)) => {
                    self.events
                        .emit(
                            STAGE_COMPLETED,
                            Some(serde_json::json!({
                                "run_id": run_id.as_str(),
                                "stage": stage.name,
                                "attempt_count": record.attempt_count,
                                "output_length": record.output_length,
                                "duration_ms": record.duration_ms,
                            })),
                        )
                        .await;
                    ctx.complete_stage(record, StageStatus::Succeeded);
                    state = next;
                }
                Err(err) => {
                    let attempts = err.attempts().unwrap_or(1);
                    let record = ExecutionRecord::failed(
                        &stage.name,
                        attempts,
                        timer.finish(),
                        err.to_string(),
                    );
                    ctx.complete_stage(record, StageStatus::Failed);
                    self.events
                        .emit(
                            STAGE_FAILED,
                            Some(serde_json::json!({
                                "run_id": run_id.as_str(),
                                "stage": stage.name,
                                "attempts": attempts,
                                "error": err.to_string(),
                            })),
                        )
                        .await;
                    return Err(err);
                }
            }
        }

        Ok(state)
    }

    /// Builds the report for a finished run and persists it once.
    ///
    /// A persist failure is logged and added to the report's warnings.
    pub async fn finish(&self, ctx: &RunContext, state: &PipelineState) -> Report {
        let mut report = build_report(ctx, state);
        if let Err(err) = self.reports.persist(&report).await {
            warn!(run_id = %ctx.run_id(), error = %err, "Failed to persist execution report");
            report.warnings.push(format!("report not persisted: {err}"));
        }

        info!(
            run_id = %ctx.run_id(),
            stages_completed = report.stages_completed,
            skipped = report.skipped_stages.len(),
            error_count = report.total_error_count,
            total_duration_ms = report.total_duration_ms,
            "Pipeline completed"
        );
        report
    }
}
