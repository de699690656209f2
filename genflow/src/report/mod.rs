//! End-of-run reporting.
//!
//! [`build_report`] is pure; persisting goes through a [`ReportSink`] and is
//! attempted once. A persist failure never fails the run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::{ExecutionRecord, PipelineState, RunContext, RunId, StateField};
use crate::errors::ReportError;
use crate::utils::{path_component, write_atomic};

/// File name of the persisted report inside the run directory.
pub const REPORT_FILE_NAME: &str = "execution_report.json";

/// Aggregated statistics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Run the report describes.
    pub run_id: RunId,
    /// Wall time of the whole run in milliseconds.
    pub total_duration_ms: f64,
    /// Stages whose output is available, executed or restored.
    pub stages_completed: usize,
    /// One record per stage, in execution order.
    pub stage_details: Vec<ExecutionRecord>,
    /// Stages restored from checkpoints.
    pub skipped_stages: Vec<String>,
    /// Character count of every produced artifact, keyed by field.
    pub output_sizes: BTreeMap<String, usize>,
    /// Transient errors seen across all stages.
    pub total_error_count: u32,
    /// When the report was built.
    pub generated_at: DateTime<Utc>,
    /// Non-fatal problems, such as a failed report write.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Report {
    /// Returns the record for a stage.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&ExecutionRecord> {
        self.stage_details.iter().find(|record| record.stage_name == name)
    }

    /// Returns true if any stage was restored from a checkpoint.
    #[must_use]
    pub fn was_resumed(&self) -> bool {
        !self.skipped_stages.is_empty()
    }
}

/// Aggregates the run's records into a [`Report`].
#[must_use]
pub fn build_report(ctx: &RunContext, state: &PipelineState) -> Report {
    let output_sizes = StateField::ALL
        .into_iter()
        .filter(|field| *field != StateField::Input && state.has(*field))
        .map(|field| (field.as_str().to_string(), state.output_length(field)))
        .collect();

    Report {
        run_id: ctx.run_id().clone(),
        total_duration_ms: ctx.elapsed_ms(),
        stages_completed: ctx.stages_completed(),
        stage_details: ctx.stage_results().values().cloned().collect(),
        skipped_stages: ctx.skipped_stages(),
        output_sizes,
        total_error_count: ctx.error_count(),
        generated_at: Utc::now(),
        warnings: Vec::new(),
    }
}

/// Destination for finished reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persists a report.
    async fn persist(&self, report: &Report) -> Result<(), ReportError>;
}

/// Discards reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReportSink;

#[async_trait]
impl ReportSink for NoOpReportSink {
    async fn persist(&self, _report: &Report) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Keeps reports in memory.
#[derive(Debug, Default)]
pub struct CollectingReportSink {
    reports: Mutex<Vec<Report>>,
}

impl CollectingReportSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every persisted report.
    #[must_use]
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl ReportSink for CollectingReportSink {
    async fn persist(&self, report: &Report) -> Result<(), ReportError> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

/// Writes `<root>/<run_id>-<digest>/execution_report.json`, next to the
/// run's checkpoints when both share a root.
#[derive(Debug, Clone)]
pub struct FileReportSink {
    root: PathBuf,
}

impl FileReportSink {
    /// Creates a sink rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the report for a run.
    #[must_use]
    pub fn path_for(&self, run_id: &RunId) -> PathBuf {
        self.root
            .join(path_component(run_id.as_str()))
            .join(REPORT_FILE_NAME)
    }
}

#[async_trait]
impl ReportSink for FileReportSink {
    async fn persist(&self, report: &Report) -> Result<(), ReportError> {
        let path = self.path_for(&report.run_id);
        let bytes = serde_json::to_vec_pretty(report)?;

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| ReportError::Task(e.to_string()))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageStatus;
    use pretty_assertions::assert_eq;

    fn finished_context() -> (RunContext, PipelineState) {
        let mut ctx = RunContext::new(RunId::new("report-run").unwrap());
        ctx.track_stages(["specify", "generate"]);
        ctx.complete_stage(ExecutionRecord::resumed("specify", 0.2, 3), StageStatus::Skipped);
        ctx.record_error();
        ctx.complete_stage(
            ExecutionRecord::succeeded("generate", 2, 15.0, 6),
            StageStatus::Succeeded,
        );
        let state = PipelineState::new("request")
            .with(StateField::Specification, "PRD")
            .with(StateField::Generated, "<html>");
        (ctx, state)
    }

    #[test]
    fn test_build_report_aggregates_context() {
        let (ctx, state) = finished_context();
        let report = build_report(&ctx, &state);

        assert_eq!(report.stages_completed, 2);
        assert_eq!(report.stage_details.len(), 2);
        assert_eq!(report.skipped_stages, vec!["specify".to_string()]);
        assert_eq!(report.total_error_count, 1);
        assert_eq!(report.output_sizes.get("generated"), Some(&6));
        assert!(!report.output_sizes.contains_key("input"));
        assert_eq!(report.stage("generate").unwrap().attempt_count, 2);
        assert!(report.was_resumed());
    }

    #[tokio::test]
    async fn test_file_sink_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileReportSink::new(dir.path());
        let (ctx, state) = finished_context();
        let report = build_report(&ctx, &state);

        sink.persist(&report).await.unwrap();

        let path = sink.path_for(&report.run_id);
        assert_eq!(
            path,
            dir.path()
                .join(path_component("report-run"))
                .join(REPORT_FILE_NAME)
        );
        let loaded: Report =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.skipped_stages, report.skipped_stages);
        assert_eq!(loaded.output_sizes, report.output_sizes);
        assert_eq!(loaded.stage_details.len(), 2);
    }

    #[tokio::test]
    async fn test_file_sink_reports_io_failure() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let sink = FileReportSink::new(blocker.path());
        let (ctx, state) = finished_context();

        let err = sink.persist(&build_report(&ctx, &state)).await.unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
    }
}
