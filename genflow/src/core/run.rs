//! Run identity and per-run bookkeeping.

use super::{ExecutionRecord, StageStatus};
use crate::errors::PipelineValidationError;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// Identifies one logical run; checkpoints are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Creates a run id from caller-supplied text.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is empty or whitespace-only.
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Run id cannot be empty or whitespace-only",
            ));
        }
        Ok(Self(id))
    }

    /// Generates a fresh, time-ordered run id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for RunId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

/// Mutable bookkeeping for a single run.
///
/// Created when a run starts and consumed by the report generator.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: RunId,
    error_count: u32,
    stage_results: IndexMap<String, ExecutionRecord>,
    statuses: IndexMap<String, StageStatus>,
    started_at: DateTime<Utc>,
    clock: Instant,
}

impl RunContext {
    /// Creates an empty context for a run.
    #[must_use]
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            error_count: 0,
            stage_results: IndexMap::new(),
            statuses: IndexMap::new(),
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Returns the number of transient errors seen so far.
    #[must_use]
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Counts one transient error.
    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    /// Registers stages as pending, preserving chain order.
    pub fn track_stages<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.statuses
                .entry(name.to_string())
                .or_insert(StageStatus::Pending);
        }
    }

    /// Returns the status of a stage.
    #[must_use]
    pub fn status(&self, stage: &str) -> StageStatus {
        self.statuses.get(stage).copied().unwrap_or_default()
    }

    /// Returns every tracked stage status in chain order.
    #[must_use]
    pub fn statuses(&self) -> &IndexMap<String, StageStatus> {
        &self.statuses
    }

    /// Appends the record for a stage and moves it to a terminal status.
    ///
    /// Records are append-once: returns false and leaves the context
    /// untouched if the stage already has one.
    pub fn complete_stage(&mut self, record: ExecutionRecord, status: StageStatus) -> bool {
        if self.stage_results.contains_key(&record.stage_name) {
            return false;
        }
        self.statuses.insert(record.stage_name.clone(), status);
        self.stage_results.insert(record.stage_name.clone(), record);
        true
    }

    /// Returns the records appended so far, in execution order.
    #[must_use]
    pub fn stage_results(&self) -> &IndexMap<String, ExecutionRecord> {
        &self.stage_results
    }

    /// Returns the record for a stage.
    #[must_use]
    pub fn record(&self, stage: &str) -> Option<&ExecutionRecord> {
        self.stage_results.get(stage)
    }

    /// Returns the stages restored from checkpoints.
    #[must_use]
    pub fn skipped_stages(&self) -> Vec<String> {
        self.statuses
            .iter()
            .filter(|(_, status)| **status == StageStatus::Skipped)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Returns the number of stages whose output is available.
    #[must_use]
    pub fn stages_completed(&self) -> usize {
        self.statuses
            .values()
            .filter(|status| status.is_completed())
            .count()
    }

    /// Returns when the run started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the elapsed wall time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.clock.elapsed().as_secs_f64() * 1000.0
    }
}
