//! Stage descriptors, the validated stage chain and the stage executor.
//!
//! A stage is pure data: the fields it reads, the field it writes, the
//! stage it follows and the prompt it sends. The [`StageExecutor`] turns one
//! descriptor plus the current state into one generation call.

mod executor;
mod registry;

pub use executor::StageExecutor;
pub use registry::{standard_descriptors, without_summary_descriptors, StageRegistry};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::StateField;
use crate::errors::{ContractErrorInfo, CycleDetectedError, PipelineValidationError};
use crate::prompts::PromptTemplate;

/// Declarative description of one stage in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    /// Unique stage name.
    pub name: String,
    /// Fields that must hold content before the stage runs.
    pub input_fields: BTreeSet<StateField>,
    /// Field the stage writes.
    pub output_field: StateField,
    /// Stage this one follows; `None` for the first stage.
    pub predecessor: Option<String>,
    /// Prompt sent to the generation service.
    pub prompt: PromptTemplate,
}

impl StageDescriptor {
    /// Creates a root stage with no inputs.
    #[must_use]
    pub fn new(name: impl Into<String>, output_field: StateField, prompt: PromptTemplate) -> Self {
        Self {
            name: name.into(),
            input_fields: BTreeSet::new(),
            output_field,
            predecessor: None,
            prompt,
        }
    }

    /// Declares a required input field.
    #[must_use]
    pub fn with_input(mut self, field: StateField) -> Self {
        self.input_fields.insert(field);
        self
    }

    /// Declares several required input fields.
    #[must_use]
    pub fn with_inputs(mut self, fields: impl IntoIterator<Item = StateField>) -> Self {
        self.input_fields.extend(fields);
        self
    }

    /// Places the stage directly after `predecessor`.
    #[must_use]
    pub fn after(mut self, predecessor: impl Into<String>) -> Self {
        self.predecessor = Some(predecessor.into());
        self
    }

    /// Checks the descriptor on its own, before it is placed in a chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the stage follows itself.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty")
                .with_error_info(
                    ContractErrorInfo::new("CONTRACT-004-NAME", "Blank stage name")
                        .with_fix_hint("Give every stage a non-empty, unique name."),
                ));
        }
        if self.predecessor.as_deref() == Some(self.name.as_str()) {
            return Err(
                CycleDetectedError::new(vec![self.name.clone(), self.name.clone()]).into(),
            );
        }
        Ok(())
    }
}
