//! Pipeline construction and execution.
//!
//! This module provides:
//! - The retry/recovery controller and its config
//! - The engine driving the stage chain
//! - A builder that validates everything before the first run

mod builder;
mod engine;
mod retry;


pub use builder::PipelineBuilder;
pub use engine::PipelineEngine;
pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig, RetryController};
