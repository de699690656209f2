//! OpenAI-compatible chat-completions client.

use super::{GenerationError, GenerationErrorKind, GenerationRequest, GenerationService};
use crate::config::GenerationConfig;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Generation service backed by an HTTP chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct HttpGenerationService {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl HttpGenerationService {
    /// Creates a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GenerationError::server_error(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Returns the configuration in use.
    #[must_use]
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.prompt},
            ],
        });
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Maps a non-success HTTP status to a generation error kind.
///
/// Returns `None` for success statuses.
#[must_use]
pub fn classify_status(status: u16) -> Option<GenerationErrorKind> {
    match status {
        200..=299 => None,
        408 => Some(GenerationErrorKind::Timeout),
        429 => Some(GenerationErrorKind::RateLimited),
        500..=599 => Some(GenerationErrorKind::ServerError),
        _ => Some(GenerationErrorKind::InvalidResponse),
    }
}

fn transport_error(err: &reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::timeout(err.to_string())
    } else {
        GenerationError::server_error(err.to_string())
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let mut builder = self
            .client
            .post(&self.config.endpoint)
            .json(&self.request_body(&request));
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        debug!(stage = %request.stage, prompt_chars = request.prompt.chars().count(), "Dispatching generation request");

        let response = builder.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status().as_u16();
        if let Some(kind) = classify_status(status) {
            let detail = response.text().await.unwrap_or_default();
            return Err(GenerationError::new(kind, format!("HTTP {status}: {detail}")));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| GenerationError::invalid_response(format!("unparsable completion: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::invalid_response("completion has no message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200), None);
        assert_eq!(classify_status(408), Some(GenerationErrorKind::Timeout));
        assert_eq!(classify_status(429), Some(GenerationErrorKind::RateLimited));
        assert_eq!(classify_status(503), Some(GenerationErrorKind::ServerError));
        assert_eq!(classify_status(400), Some(GenerationErrorKind::InvalidResponse));
    }

    #[test]
    fn test_request_body_includes_both_messages() {
        let service = HttpGenerationService::new(GenerationConfig {
            max_tokens: Some(512),
            ..GenerationConfig::default()
        })
        .unwrap();
        let body = service.request_body(&GenerationRequest::new("summarize", "sys", "user text"));

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user text");
        assert_eq!(body["max_tokens"], 512);
    }

    #[test]
    fn test_completion_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let completion: ChatCompletion = serde_json::from_str(raw).unwrap();
        assert_eq!(completion.choices[0].message.content.as_deref(), Some("hello"));
    }
}
