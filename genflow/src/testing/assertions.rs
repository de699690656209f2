//! Test assertions for reports and events.

use crate::core::PipelineState;
use crate::events::{CollectingEventSink, STAGE_SKIPPED};
use crate::report::Report;

/// Asserts that the report has one successful record per stage and an
/// output size for every produced field.
pub fn assert_report_complete(report: &Report, stages: &[&str], state: &PipelineState) {
    let recorded: Vec<&str> = report
        .stage_details
        .iter()
        .map(|record| record.stage_name.as_str())
        .collect();
    assert_eq!(
        recorded, stages,
        "Expected records for {stages:?}, got {recorded:?}"
    );
    assert!(
        report.stage_details.iter().all(|record| record.success),
        "Expected every stage to succeed: {:?}",
        report.stage_details
    );
    assert_eq!(report.stages_completed, stages.len());

    for (field, size) in &report.output_sizes {
        let actual = field
            .parse()
            .map(|field| state.output_length(field))
            .unwrap_or_default();
        assert_eq!(
            *size, actual,
            "Output size for '{field}' does not match the final state"
        );
    }
}

/// Asserts that a stage was restored from its checkpoint.
pub fn assert_stage_skipped(report: &Report, stage: &str) {
    let record = report
        .stage(stage)
        .unwrap_or_else(|| panic!("No record for stage '{stage}'"));
    assert!(record.resumed, "Expected '{stage}' to be resumed");
    assert_eq!(record.attempt_count, 0, "Resumed stage '{stage}' made attempts");
    assert!(
        report.skipped_stages.iter().any(|name| name == stage),
        "Expected '{stage}' in skipped stages {:?}",
        report.skipped_stages
    );
}

/// Asserts that a stage executed rather than being restored.
pub fn assert_stage_executed(report: &Report, stage: &str, attempts: u32) {
    let record = report
        .stage(stage)
        .unwrap_or_else(|| panic!("No record for stage '{stage}'"));
    assert!(!record.resumed, "Expected '{stage}' to execute");
    assert_eq!(
        record.attempt_count, attempts,
        "Unexpected attempt count for '{stage}'"
    );
}

/// Asserts the exact stages that emitted a skip event, in order.
pub fn assert_skipped_events(events: &CollectingEventSink, expected: &[&str]) {
    let skipped = events.stages_for(STAGE_SKIPPED);
    assert_eq!(skipped, expected, "Unexpected skip events");
}
