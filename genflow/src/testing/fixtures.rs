//! Test fixtures for pipeline testing.

use std::sync::Arc;

use super::ScriptedGenerationService;
use crate::checkpoint::InMemoryCheckpointStore;
use crate::core::{PipelineState, RunId};
use crate::errors::PipelineError;
use crate::events::CollectingEventSink;
use crate::pipeline::{PipelineBuilder, PipelineEngine, RetryConfig};
use crate::report::CollectingReportSink;
use crate::stages::StageRegistry;

/// A product request used across tests and benchmarks.
pub const SAMPLE_INPUT: &str = "Build a single-page site for a neighbourhood bakery with a \
     menu, opening hours and a contact form.";

/// Retry settings with a 1ms time unit so backoff does not slow tests down.
#[must_use]
pub fn fast_retry() -> RetryConfig {
    RetryConfig::new().with_time_unit_ms(1)
}

/// An engine wired to in-memory collaborators that tests can inspect.
#[derive(Debug)]
pub struct TestHarness {
    /// The scripted generation service.
    pub generator: Arc<ScriptedGenerationService>,
    /// The checkpoint store.
    pub store: Arc<InMemoryCheckpointStore>,
    /// Every emitted event.
    pub events: Arc<CollectingEventSink>,
    /// Every persisted report.
    pub reports: Arc<CollectingReportSink>,
    /// The engine under test.
    pub engine: PipelineEngine,
}

impl TestHarness {
    /// Harness over `specify → generate → review → verify`.
    pub fn four_stage(generator: ScriptedGenerationService) -> Result<Self, PipelineError> {
        Self::with_registry(StageRegistry::without_summary(), generator, fast_retry())
    }

    /// Harness over the standard five-stage chain.
    pub fn standard(generator: ScriptedGenerationService) -> Result<Self, PipelineError> {
        Self::with_registry(StageRegistry::standard(), generator, fast_retry())
    }

    /// Harness over any registry and retry config.
    pub fn with_registry(
        registry: StageRegistry,
        generator: ScriptedGenerationService,
        retry: RetryConfig,
    ) -> Result<Self, PipelineError> {
        let generator = Arc::new(generator);
        let store = Arc::new(InMemoryCheckpointStore::new());
        Self::with_store(registry, generator, store, retry)
    }

    /// Harness sharing an existing store and generator, e.g. to simulate a
    /// restarted process.
    pub fn with_store(
        registry: StageRegistry,
        generator: Arc<ScriptedGenerationService>,
        store: Arc<InMemoryCheckpointStore>,
        retry: RetryConfig,
    ) -> Result<Self, PipelineError> {
        let events = Arc::new(CollectingEventSink::new());
        let reports = Arc::new(CollectingReportSink::new());
        let engine = PipelineBuilder::new(generator.clone(), store.clone())
            .registry(registry)
            .retry(retry)
            .event_sink(events.clone())
            .report_sink(reports.clone())
            .build()?;

        Ok(Self {
            generator,
            store,
            events,
            reports,
            engine,
        })
    }

    /// Initial state holding [`SAMPLE_INPUT`].
    #[must_use]
    pub fn sample_state() -> PipelineState {
        PipelineState::new(SAMPLE_INPUT)
    }

    /// A run id unique to this call.
    #[must_use]
    pub fn run_id() -> RunId {
        RunId::generate()
    }
}
