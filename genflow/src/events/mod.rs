//! Lifecycle events.
//!
//! The engine reports progress through an injected [`EventSink`]. Event
//! payloads are JSON objects that always carry `run_id`, and carry `stage`
//! for stage-level events.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A run began.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// A stage was restored from its checkpoint.
pub const STAGE_SKIPPED: &str = "stage.skipped";
/// A stage began executing.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage attempt failed and will be retried.
pub const STAGE_RETRY: &str = "stage.retry";
/// A stage produced its output.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage aborted the run.
pub const STAGE_FAILED: &str = "stage.failed";
/// Every stage succeeded.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// The run was aborted.
pub const PIPELINE_FAILED: &str = "pipeline.failed";
