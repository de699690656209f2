//! Scripted generation service for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::generation::{GenerationError, GenerationRequest, GenerationService};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Return this text.
    Respond(String),
    /// Fail with this error.
    Fail(GenerationError),
}

/// A generation service whose replies are scripted per stage.
///
/// Each stage has a queue of outcomes consumed in order. Once a stage's
/// queue is empty it answers with a deterministic echo of the request, so
/// repeated runs over the same input produce the same artifacts. Every call
/// is recorded.
#[derive(Debug, Default)]
pub struct ScriptedGenerationService {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedOutcome>>>,
    broken: Mutex<HashMap<String, GenerationError>>,
    calls: Mutex<Vec<GenerationRequest>>,
    latency: Option<Duration>,
}

impl ScriptedGenerationService {
    /// Creates a service that echoes every request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends outcomes to a stage's queue.
    #[must_use]
    pub fn script(
        mut self,
        stage: &str,
        outcomes: impl IntoIterator<Item = ScriptedOutcome>,
    ) -> Self {
        self.scripts
            .get_mut()
            .entry(stage.to_string())
            .or_default()
            .extend(outcomes);
        self
    }

    /// Queues a successful reply.
    #[must_use]
    pub fn respond(self, stage: &str, text: impl Into<String>) -> Self {
        self.script(stage, [ScriptedOutcome::Respond(text.into())])
    }

    /// Queues `times` server errors.
    #[must_use]
    pub fn fail_times(self, stage: &str, times: usize) -> Self {
        let failures = (1..=times).map(|n| {
            ScriptedOutcome::Fail(GenerationError::server_error(format!(
                "scripted failure {n} for {stage}"
            )))
        });
        self.script(stage, failures)
    }

    /// Makes every call for a stage time out, ignoring its queue.
    #[must_use]
    pub fn always_fail(mut self, stage: &str) -> Self {
        self.broken.get_mut().insert(
            stage.to_string(),
            GenerationError::timeout(format!("scripted timeout for {stage}")),
        );
        self
    }

    /// Delays every reply.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Appends an outcome after construction.
    pub fn push(&self, stage: &str, outcome: ScriptedOutcome) {
        self.scripts
            .lock()
            .entry(stage.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Stops failing a stage configured with [`Self::always_fail`].
    pub fn heal(&self, stage: &str) {
        self.broken.lock().remove(stage);
    }

    /// Every request received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().clone()
    }

    /// Total number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of calls made for one stage.
    #[must_use]
    pub fn calls_for(&self, stage: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.stage == stage).count()
    }

    /// Stage names of every call, in order.
    #[must_use]
    pub fn stages_called(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.stage.clone()).collect()
    }

    /// Forgets recorded calls.
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    /// The reply produced when a stage has nothing scripted.
    #[must_use]
    pub fn echo(request: &GenerationRequest) -> String {
        let excerpt: String = request
            .prompt
            .split_whitespace()
            .rev()
            .take(12)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "[{}] {} chars in; tail: {excerpt}",
            request.stage,
            request.prompt.chars().count()
        )
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerationService {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        self.calls.lock().push(request.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(err) = self.broken.lock().get(&request.stage) {
            return Err(err.clone());
        }

        let next = self
            .scripts
            .lock()
            .get_mut(&request.stage)
            .and_then(VecDeque::pop_front);
        match next {
            Some(ScriptedOutcome::Respond(text)) => Ok(text),
            Some(ScriptedOutcome::Fail(err)) => Err(err),
            None => Ok(Self::echo(&request)),
        }
    }
}
