//! Core domain model types for genflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - The typed artifact record passed between stages
//! - Stage status and execution records
//! - Run identity and per-run context

mod field;
mod record;
mod run;
mod state;
mod status;

pub use field::StateField;
pub use record::ExecutionRecord;
pub use run::{RunContext, RunId};
pub use state::{PipelineState, StateSnapshot};
pub use status::StageStatus;
