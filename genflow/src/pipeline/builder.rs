//! Engine builder with validation.

use std::sync::Arc;

use super::engine::PipelineEngine;
use super::retry::{RetryConfig, RetryController};
use crate::checkpoint::CheckpointStore;
use crate::config::GenflowConfig;
use crate::errors::PipelineError;
use crate::events::{EventSink, LoggingEventSink};
use crate::generation::GenerationService;
use crate::report::{NoOpReportSink, ReportSink};
use crate::stages::{StageDescriptor, StageExecutor, StageRegistry};

/// Assembles a [`PipelineEngine`] from injected collaborators.
///
/// The generation service and checkpoint store are required. Without
/// explicit stages the engine runs [`StageRegistry::standard`]; reports are
/// discarded and events are logged unless sinks are supplied.
pub struct PipelineBuilder {
    generator: Arc<dyn GenerationService>,
    store: Arc<dyn CheckpointStore>,
    stages: Vec<StageDescriptor>,
    registry: Option<StageRegistry>,
    retry: RetryConfig,
    reports: Arc<dyn ReportSink>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("stages", &self.stages.len())
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    /// Creates a builder around the two required collaborators.
    #[must_use]
    pub fn new(generator: Arc<dyn GenerationService>, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            generator,
            store,
            stages: Vec::new(),
            registry: None,
            retry: RetryConfig::default(),
            reports: Arc::new(NoOpReportSink),
            events: Arc::new(LoggingEventSink::default()),
        }
    }

    /// Creates a builder with the file store, file report sink and retry
    /// settings from `config`.
    #[must_use]
    pub fn from_config(config: &GenflowConfig, generator: Arc<dyn GenerationService>) -> Self {
        Self::new(generator, config.checkpoint_store())
            .retry(config.retry.clone())
            .report_sink(config.report_sink())
    }

    /// Adds a stage. Explicit stages replace any registry set earlier.
    #[must_use]
    pub fn stage(mut self, descriptor: StageDescriptor) -> Self {
        self.stages.push(descriptor);
        self
    }

    /// Adds several stages.
    #[must_use]
    pub fn stages(mut self, descriptors: impl IntoIterator<Item = StageDescriptor>) -> Self {
        self.stages.extend(descriptors);
        self
    }

    /// Uses an already validated registry.
    #[must_use]
    pub fn registry(mut self, registry: StageRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the retry config.
    #[must_use]
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Sets where reports are persisted.
    #[must_use]
    pub fn report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.reports = sink;
        self
    }

    /// Sets where lifecycle events go.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Validates the configuration and the stage chain.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for an unusable retry config and
    /// [`PipelineError::InvalidChain`] for a malformed stage chain.
    pub fn build(self) -> Result<PipelineEngine, PipelineError> {
        self.retry.validate()?;

        let registry = if !self.stages.is_empty() {
            StageRegistry::new(self.stages)?
        } else if let Some(registry) = self.registry {
            registry
        } else {
            StageRegistry::standard()
        };

        Ok(PipelineEngine::new(
            registry,
            StageExecutor::new(self.generator, self.store),
            RetryController::new(self.retry),
            self.reports,
            self.events,
        ))
    }
}
