//! Per-stage execution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one stage within one run.
///
/// Reflects the attempt that succeeded or the attempt that ended the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Stage name.
    pub stage_name: String,
    /// Attempts made; zero when the stage was restored from a checkpoint.
    pub attempt_count: u32,
    /// Whether the stage's output is available.
    pub success: bool,
    /// Whether the output came from a checkpoint instead of a new call.
    #[serde(default)]
    pub resumed: bool,
    /// Wall time of the recorded attempt in milliseconds.
    pub duration_ms: f64,
    /// Character count of the stage output.
    pub output_length: usize,
    /// When the record was created.
    pub timestamp: DateTime<Utc>,
    /// Error text for failed stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// Creates a record for a stage that executed successfully.
    #[must_use]
    pub fn succeeded(
        stage_name: impl Into<String>,
        attempt_count: u32,
        duration_ms: f64,
        output_length: usize,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            attempt_count,
            success: true,
            resumed: false,
            duration_ms,
            output_length,
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Creates a record for a stage restored from its checkpoint.
    #[must_use]
    pub fn resumed(stage_name: impl Into<String>, duration_ms: f64, output_length: usize) -> Self {
        Self {
            stage_name: stage_name.into(),
            attempt_count: 0,
            success: true,
            resumed: true,
            duration_ms,
            output_length,
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Creates a record for a stage that aborted the run.
    #[must_use]
    pub fn failed(
        stage_name: impl Into<String>,
        attempt_count: u32,
        duration_ms: f64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            attempt_count,
            success: false,
            resumed: false,
            duration_ms,
            output_length: 0,
            timestamp: Utc::now(),
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeded_record() {
        let record = ExecutionRecord::succeeded("generate", 2, 12.5, 640);
        assert!(record.success);
        assert!(!record.resumed);
        assert_eq!(record.attempt_count, 2);
        assert_eq!(record.output_length, 640);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_resumed_record_has_no_attempts() {
        let record = ExecutionRecord::resumed("summarize", 0.1, 80);
        assert!(record.success);
        assert!(record.resumed);
        assert_eq!(record.attempt_count, 0);
    }

    #[test]
    fn test_failed_record_serialization() {
        let record = ExecutionRecord::failed("review", 3, 40.0, "timeout: slow");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "timeout: slow");

        let back: ExecutionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
