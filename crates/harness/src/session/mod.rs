mod aggregator;
mod panel;

pub use aggregator::{
    summarize_outcomes, BeginOutcome, CategoryReport, Outcome, OutcomeRecord, TestSession,
    SUMMARY_ITEMIZED_LIMIT,
};
pub use panel::{
    outcome_color, result_box_field, rich_markup, LogTint, NoOpPanel, OutcomeColor,
    RecordingPanel, ResultPanel, LOG_FIELD, OUTPUT_FIELD,
};
