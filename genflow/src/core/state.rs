//! The artifact record passed from stage to stage.

use super::StateField;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Flat string mapping persisted inside a checkpoint.
pub type StateSnapshot = BTreeMap<String, String>;

/// Artifacts produced so far in a run.
///
/// Each slot stays `None` until its producing stage has run. Writes go
/// through [`PipelineState::set`] or [`PipelineState::merge_checkpoint`];
/// there is no bulk update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Raw request supplied by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Output of the summarize stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Output of the specify stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification: Option<String>,
    /// Output of the generate stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<String>,
    /// Output of the review stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed: Option<String>,
    /// Output of the verify stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
}

impl PipelineState {
    /// Creates a state holding only the caller's input.
    #[must_use]
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: Some(input.into()),
            ..Self::default()
        }
    }

    fn slot(&self, field: StateField) -> &Option<String> {
        match field {
            StateField::Input => &self.input,
            StateField::Summary => &self.summary,
            StateField::Specification => &self.specification,
            StateField::Generated => &self.generated,
            StateField::Reviewed => &self.reviewed,
            StateField::Verification => &self.verification,
        }
    }

    fn slot_mut(&mut self, field: StateField) -> &mut Option<String> {
        match field {
            StateField::Input => &mut self.input,
            StateField::Summary => &mut self.summary,
            StateField::Specification => &mut self.specification,
            StateField::Generated => &mut self.generated,
            StateField::Reviewed => &mut self.reviewed,
            StateField::Verification => &mut self.verification,
        }
    }

    /// Returns the raw value of a field.
    #[must_use]
    pub fn get(&self, field: StateField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    /// Returns the value of a field only if it holds non-whitespace text.
    #[must_use]
    pub fn require(&self, field: StateField) -> Option<&str> {
        self.get(field).filter(|value| !value.trim().is_empty())
    }

    /// Returns true if the field holds non-whitespace text.
    #[must_use]
    pub fn has(&self, field: StateField) -> bool {
        self.require(field).is_some()
    }

    /// Assigns a field.
    pub fn set(&mut self, field: StateField, value: impl Into<String>) {
        *self.slot_mut(field) = Some(value.into());
    }

    /// Builder form of [`PipelineState::set`].
    #[must_use]
    pub fn with(mut self, field: StateField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Character count of a field, zero when absent.
    #[must_use]
    pub fn output_length(&self, field: StateField) -> usize {
        self.get(field).map_or(0, |value| value.chars().count())
    }

    /// Returns every non-empty field keyed by name.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateField::ALL
            .into_iter()
            .filter_map(|field| {
                self.require(field)
                    .map(|value| (field.as_str().to_string(), value.to_string()))
            })
            .collect()
    }

    /// Rebuilds a state from a snapshot, ignoring unknown keys.
    #[must_use]
    pub fn from_snapshot(snapshot: &StateSnapshot) -> Self {
        let mut state = Self::default();
        for (key, value) in snapshot {
            if let Ok(field) = key.parse::<StateField>() {
                state.set(field, value.clone());
            }
        }
        state
    }

    /// Merges a checkpoint snapshot into this state.
    ///
    /// `output_field` is always taken from the snapshot. Every other field is
    /// only filled where this state has nothing yet; existing values win.
    /// Returns the fields that were written.
    pub fn merge_checkpoint(
        &mut self,
        snapshot: &StateSnapshot,
        output_field: StateField,
    ) -> Vec<StateField> {
        let mut written = Vec::new();

        for (key, value) in snapshot {
            let Ok(field) = key.parse::<StateField>() else {
                warn!(key = %key, "Ignoring unknown field in checkpoint snapshot");
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }

            if field == output_field {
                self.set(field, value.clone());
                written.push(field);
                continue;
            }

            match self.require(field) {
                None => {
                    self.set(field, value.clone());
                    written.push(field);
                }
                Some(existing) if existing != value => {
                    warn!(
                        field = %field,
                        "Checkpoint value differs from current state; keeping current value"
                    );
                }
                Some(_) => {}
            }
        }

        written
    }
}
