//! Stage execution status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a stage stands within the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The stage has not been reached yet.
    #[default]
    Pending,
    /// The stage was satisfied from a valid checkpoint.
    Skipped,
    /// The stage executed and its output was checkpointed.
    Succeeded,
    /// The stage failed and aborted the run.
    Failed,
}

impl StageStatus {
    /// Returns true if the stage's output is available to later stages.
    #[must_use]
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Skipped | Self::Succeeded)
    }

    /// Returns true if no further transition is possible for the stage.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Skipped => write!(f, "skipped"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_pending() {
        assert_eq!(StageStatus::default(), StageStatus::Pending);
        assert!(!StageStatus::Pending.is_terminal());
    }

    #[test]
    fn test_completed_statuses() {
        assert!(StageStatus::Skipped.is_completed());
        assert!(StageStatus::Succeeded.is_completed());
        assert!(!StageStatus::Failed.is_completed());
        assert!(StageStatus::Failed.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(StageStatus::Skipped.to_string(), "skipped");
        assert_eq!(
            serde_json::to_string(&StageStatus::Succeeded).unwrap(),
            "\"succeeded\""
        );
    }
}
