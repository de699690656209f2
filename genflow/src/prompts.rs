//! Prompt templates for the built-in stages.
//!
//! Templates reference state fields as `{field}` placeholders. Rendering
//! happens before dispatch, so a template that names an unknown field or a
//! field with no content fails as a [`ValidationError`] and never reaches the
//! generation service.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::core::{PipelineState, StateField};
use crate::errors::ValidationError;

/// System instruction shared by the default stages.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a careful senior engineer. Answer with the requested document only, \
     without preamble or closing remarks.";

/// Condenses the raw request.
pub const SUMMARIZE_TEMPLATE: &str = "Summarize the following product request in at most \
     five sentences. Keep every concrete requirement and constraint.\n\nRequest:\n{input}";

/// Turns the request into a requirements document.
pub const SPECIFY_TEMPLATE: &str = "Write a product requirements document for the request \
     below. List the user-facing features, the page structure and any data that must be \
     displayed.\n\nRequest:\n{input}";

/// Same as [`SPECIFY_TEMPLATE`] with the summary as extra guidance.
pub const SPECIFY_WITH_SUMMARY_TEMPLATE: &str = "Write a product requirements document for \
     the request below. List the user-facing features, the page structure and any data that \
     must be displayed.\n\nRequest:\n{input}\n\nSummary of the request:\n{summary}";

/// Produces the artifact from the requirements document.
pub const GENERATE_TEMPLATE: &str = "Implement the following requirements as a single \
     self-contained HTML document with inline CSS and JavaScript.\n\nRequirements:\n\
     {specification}";

/// Reviews and corrects the generated artifact.
pub const REVIEW_TEMPLATE: &str = "Review the HTML document below for bugs, accessibility \
     problems and missing requirements. Return the corrected document in full.\n\n\
     Document:\n{generated}";

/// Verifies the reviewed artifact.
pub const VERIFY_TEMPLATE: &str = "Act as a QA engineer. Describe how you would test the HTML \
     document below, then list every defect you can find and whether it blocks release.\n\n\
     Document:\n{reviewed}";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("static pattern is valid"));

/// A system prompt plus a user template with `{field}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// System instruction sent with every request.
    pub system: String,
    /// User prompt template.
    pub template: String,
}

impl PromptTemplate {
    /// Creates a template using [`DEFAULT_SYSTEM_PROMPT`].
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            template: template.into(),
        }
    }

    /// Replaces the system instruction.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// Placeholder names in order of first appearance.
    #[must_use]
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for captures in PLACEHOLDER.captures_iter(&self.template) {
            let name = &captures[1];
            if !names.iter().any(|existing| existing == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Substitutes every placeholder with its state value.
    pub fn render(&self, stage: &str, state: &PipelineState) -> Result<String, ValidationError> {
        let mut rendered = String::with_capacity(self.template.len());
        let mut last = 0;

        for captures in PLACEHOLDER.captures_iter(&self.template) {
            let whole = captures.get(0).map_or(0..0, |m| m.range());
            let name = &captures[1];
            let field: StateField = name.parse().map_err(|_| {
                ValidationError::malformed_request(
                    stage,
                    format!("prompt references unknown field '{{{name}}}'"),
                )
            })?;
            let value = state
                .require(field)
                .ok_or_else(|| ValidationError::missing_input(stage, field.as_str()))?;

            rendered.push_str(&self.template[last..whole.start]);
            rendered.push_str(value);
            last = whole.end;
        }
        rendered.push_str(&self.template[last..]);

        if rendered.trim().is_empty() {
            return Err(ValidationError::malformed_request(stage, "prompt is empty"));
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_substitutes_fields() {
        let template = PromptTemplate::new("Build: {specification}\nFrom: {input}");
        let state = PipelineState::new("a shop").with(StateField::Specification, "PRD");

        assert_eq!(template.render("generate", &state).unwrap(), "Build: PRD\nFrom: a shop");
    }

    #[test]
    fn test_placeholders_deduplicated() {
        let template = PromptTemplate::new("{input} and {summary} and {input}");
        assert_eq!(template.placeholders(), vec!["input", "summary"]);
    }

    #[test]
    fn test_unknown_placeholder_is_malformed() {
        let template = PromptTemplate::new("Use {html_code}");
        let err = template.render("review", &PipelineState::new("x")).unwrap_err();

        assert_eq!(err.stage, "review");
        assert!(err.field.is_none());
        assert!(err.message.contains("html_code"));
    }

    #[test]
    fn test_empty_field_is_missing_input() {
        let template = PromptTemplate::new(GENERATE_TEMPLATE);
        let state = PipelineState::new("x").with(StateField::Specification, "  ");
        let err = template.render("generate", &state).unwrap_err();

        assert_eq!(err.field.as_deref(), Some("specification"));
    }

    #[test]
    fn test_blank_template_rejected() {
        let template = PromptTemplate::new("   ");
        assert!(template.render("verify", &PipelineState::new("x")).is_err());
    }

    #[test]
    fn test_non_field_braces_left_alone() {
        let template = PromptTemplate::new("Return JSON like {\"ok\": true} for {input}");
        let rendered = template.render("verify", &PipelineState::new("x")).unwrap();
        assert_eq!(rendered, "Return JSON like {\"ok\": true} for x");
    }
}
