//! Testing utilities for genflow pipelines.
//!
//! This module provides:
//! - A scripted generation service
//! - Report and event assertions
//! - A harness wiring an engine to in-memory collaborators

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_report_complete, assert_skipped_events, assert_stage_executed, assert_stage_skipped,
};
pub use fixtures::{fast_retry, TestHarness, SAMPLE_INPUT};
pub use mocks::{ScriptedGenerationService, ScriptedOutcome};
