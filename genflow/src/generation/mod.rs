//! The generation service seam.
//!
//! Stages never talk to a model backend directly; they go through a
//! [`GenerationService`] injected into the engine at construction. Every
//! error a service reports is considered transient by the retry controller.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{classify_status, HttpGenerationService};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single prompt dispatched to the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The stage issuing the request.
    pub stage: String,
    /// System instruction sent ahead of the prompt.
    pub system_prompt: String,
    /// The rendered user prompt.
    pub prompt: String,
    /// Optional structured context for backends that accept it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl GenerationRequest {
    /// Creates a new request.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        system_prompt: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            context: None,
        }
    }

    /// Attaches structured context.
    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// Classification of generation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    /// The backend did not answer in time.
    Timeout,
    /// The backend throttled the request.
    RateLimited,
    /// The backend failed internally or was unreachable.
    ServerError,
    /// The backend answered with something that is not usable output.
    InvalidResponse,
}

impl std::fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::ServerError => write!(f, "server_error"),
            Self::InvalidResponse => write!(f, "invalid_response"),
        }
    }
}

/// Error reported by a [`GenerationService`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct GenerationError {
    /// The failure class.
    pub kind: GenerationErrorKind,
    /// Backend-provided detail.
    pub message: String,
}

impl GenerationError {
    /// Creates a new generation error.
    #[must_use]
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::Timeout, message)
    }

    /// Creates a rate-limit error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::RateLimited, message)
    }

    /// Creates a server error.
    #[must_use]
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::ServerError, message)
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::InvalidResponse, message)
    }
}

/// A text-generation backend.
///
/// Implementations perform exactly one request per call; retrying is the
/// caller's job.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generates text for the given request.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}
