//! # Genflow
//!
//! A resumable pipeline engine for chained text-generation stages.
//!
//! A run turns a raw product request into a specification, generated code,
//! a reviewed revision and a verification verdict. Each stage makes one
//! call to a [`generation::GenerationService`] and checkpoints its output
//! before the next stage starts, so a crashed or aborted run picks up where
//! it left off:
//!
//! - **Checkpoint/resume**: stages with a valid checkpoint are restored, never re-executed
//! - **Bounded retry**: transient service failures back off exponentially
//! - **Early validation**: missing inputs fail before any service call
//! - **Execution reports**: per-stage timings, attempts and output sizes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use genflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = GenflowConfig::from_env()?;
//! let generator = Arc::new(HttpGenerationService::new(config.generation.clone())?);
//! let engine = PipelineBuilder::from_config(&config, generator).build()?;
//!
//! let report = engine
//!     .start(RunId::generate(), PipelineState::new("A todo app with tags"))
//!     .await?;
//! println!("{} stages completed", report.stages_completed);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod generation;
pub mod observability;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checkpoint::{
        Checkpoint, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
    };
    pub use crate::config::{GenerationConfig, GenflowConfig};
    pub use crate::core::{
        ExecutionRecord, PipelineState, RunContext, RunId, StageStatus, StateField,
    };
    pub use crate::errors::{
        CheckpointCorruptionError, FatalPipelineError, PipelineError,
        PipelineValidationError, TransientServiceError, ValidationError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    #[cfg(feature = "http")]
    pub use crate::generation::HttpGenerationService;
    pub use crate::generation::{GenerationError, GenerationRequest, GenerationService};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{PipelineBuilder, PipelineEngine, RetryConfig};
    pub use crate::prompts::PromptTemplate;
    pub use crate::report::{FileReportSink, Report, ReportSink};
    pub use crate::stages::{StageDescriptor, StageRegistry};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn prelude_exposes_standard_chain() {
        let registry = StageRegistry::standard();
        assert_eq!(
            registry.names(),
            vec!["summarize", "specify", "generate", "review", "verify"]
        );
    }
}
