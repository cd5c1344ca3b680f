use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::command::{ControllerHandle, RemoteCall};
use crate::logscan::{contains_any, error_line_count, timestamped_error_lines, HostLogBuffer};
use crate::schedule::{DelayQueue, DelayedCommandSink};

use super::panel::{outcome_color, result_box_field, LogTint, ResultPanel, OUTPUT_FIELD};

/// Outcome lists longer than this collapse into pass/fail counts.
pub const SUMMARY_ITEMIZED_LIMIT: usize = 6;

const FINISH_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    Failed,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeRecord {
    pub outcome: Outcome,
    pub messages: Vec<String>,
}

/// Snapshot of a closed category for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryReport {
    pub id: u32,
    pub summary: String,
    pub outcomes: Vec<OutcomeRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    Started,
    /// A category was already open; the caller is expected to skip this one.
    Busy { open_id: u32 },
}

impl BeginOutcome {
    pub fn started(self) -> bool {
        matches!(self, BeginOutcome::Started)
    }
}

#[derive(Debug)]
struct OpenCategory {
    id: u32,
    queue: DelayQueue,
    outcomes: Vec<OutcomeRecord>,
}

/// One category of sequential sub-tests: begin/end lifecycle, deferred step
/// scheduling, and result accumulation with live panel updates. At most one
/// category is open at a time.
#[derive(Debug)]
pub struct TestSession {
    controller: ControllerHandle,
    open: Option<OpenCategory>,
}

impl TestSession {
    pub fn new(controller: ControllerHandle) -> Self {
        Self {
            controller,
            open: None,
        }
    }

    pub fn controller(&self) -> &ControllerHandle {
        &self.controller
    }

    pub fn open_id(&self) -> Option<u32> {
        self.open.as_ref().map(|open| open.id)
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Opens a category. When one is already open this is a logged no-op
    /// returning busy; state, including the open category's outcomes, is
    /// untouched.
    pub fn begin(
        &mut self,
        id: u32,
        panel: &mut dyn ResultPanel,
        logs: &mut dyn HostLogBuffer,
    ) -> BeginOutcome {
        if let Some(open) = &self.open {
            warn!(requested_id = id, open_id = open.id, "category_begin_while_open");
            log_line(
                panel,
                &format!("--- SKIP TEST CATEGORY {id}, still running tests ---"),
                LogTint::Orange,
            );
            return BeginOutcome::Busy { open_id: open.id };
        }

        self.open = Some(OpenCategory {
            id,
            queue: DelayQueue::new(self.controller.clone()),
            outcomes: Vec::new(),
        });
        panel.set_text(&result_box_field(id), "-");
        logs.clear();
        info!(id, "category_started");
        log_line(panel, &format!("TEST CATEGORY {id} START  -->"), LogTint::Plain);
        BeginOutcome::Started
    }

    /// Appends a PASS/FAILED outcome, rewrites the live summary with its
    /// derived color, and logs the messages plus a colorized outcome line.
    pub fn push_result(&mut self, succ: bool, messages: &[String], panel: &mut dyn ResultPanel) {
        let Some(open) = self.open.as_mut() else {
            panic!("push_result with no open category");
        };

        let outcome = if succ { Outcome::Pass } else { Outcome::Failed };
        open.outcomes.push(OutcomeRecord {
            outcome,
            messages: messages.to_vec(),
        });

        let summary = summarize_outcomes(&open.outcomes);
        let field = result_box_field(open.id);
        panel.set_text(&field, &summary);
        panel.set_color(&field, outcome_color(&summary));

        match messages {
            [] => {}
            [message] => {
                let tint = if succ && !message.to_lowercase().contains("warning") {
                    LogTint::Plain
                } else {
                    LogTint::Orange
                };
                log_line(panel, &format!("\t\tTEST RESULT: {message}"), tint);
            }
            many => {
                let count = many.len();
                for (index, message) in many.iter().enumerate() {
                    let last = index == count - 1;
                    let mut tint = if succ || !last {
                        LogTint::Plain
                    } else {
                        LogTint::Orange
                    };
                    if message.to_lowercase().contains("warning") {
                        tint = LogTint::Orange;
                    }
                    log_line(
                        panel,
                        &format!("\t\tTEST RESULT {}/{count}: {message}", index + 1),
                        tint,
                    );
                }
            }
        }

        let tint = if succ { LogTint::Green } else { LogTint::Red };
        log_line(panel, outcome.label(), tint);
    }

    /// Schedules the next deferred step `delay_from_previous` after the
    /// previous one. Panics when no category is open: steps outside a
    /// category are a broken test script.
    pub fn push_call(
        &mut self,
        sink: &mut dyn DelayedCommandSink,
        call: RemoteCall,
        delay_from_previous: Duration,
    ) -> Duration {
        let Some(open) = self.open.as_mut() else {
            panic!("push_call with no open category");
        };
        open.queue.enqueue(sink, call, delay_from_previous)
    }

    /// Schedules the trailing `end` command shortly after the last step.
    pub fn finish(&mut self, id: u32, sink: &mut dyn DelayedCommandSink) -> Duration {
        let call = RemoteCall::controller(&self.controller, "end").kwarg("id", id);
        self.push_call(sink, call, FINISH_DELAY)
    }

    /// Closes the category and flushes the summary. The id must match the
    /// open category; a mismatch is a broken test script and fails hard.
    pub fn end(
        &mut self,
        id: u32,
        panel: &mut dyn ResultPanel,
        logs: &mut dyn HostLogBuffer,
    ) -> CategoryReport {
        let lines = logs.recent_lines(None);
        for line in timestamped_error_lines(&lines) {
            log_line(panel, line, LogTint::Red);
        }

        let open = match self.open.take() {
            Some(open) if open.id == id => open,
            Some(open) => panic!(
                "end id {id} does not match open category {}",
                open.id
            ),
            None => panic!("end id {id} with no open category"),
        };

        self.set_output(panel, &format!("Done. ID {id}"));
        log_line(
            panel,
            &format!("<-------------- TEST CATEGORY {id} FINISH\n"),
            LogTint::Plain,
        );
        info!(
            id,
            outcome_count = open.outcomes.len(),
            elapsed_ms = open.queue.elapsed().as_millis() as u64,
            "category_finished"
        );

        CategoryReport {
            id,
            summary: summarize_outcomes(&open.outcomes),
            outcomes: open.outcomes,
        }
    }

    pub fn set_output(&self, panel: &mut dyn ResultPanel, text: &str) {
        panel.set_text(OUTPUT_FIELD, text);
    }

    /// `\t> `-prefixed step annotation in the scrolling log.
    pub fn note(&self, panel: &mut dyn ResultPanel, message: &str) {
        log_line(panel, &format!("\t> {message}"), LogTint::Plain);
    }

    /// Pushes an outcome from the host log's error count.
    pub fn check_error_in_log(
        &mut self,
        panel: &mut dyn ResultPanel,
        logs: &dyn HostLogBuffer,
    ) {
        let lines = logs.recent_lines(None);
        let error_count = error_line_count(&lines);
        let message = if error_count > 0 {
            format!("Has {error_count} Error in log")
        } else {
            "No Error in log".to_string()
        };
        self.push_result(error_count == 0, &[message], panel);
    }

    /// Pushes an outcome from whether any expected entry appears in the host
    /// log.
    pub fn check_log_contains(
        &mut self,
        panel: &mut dyn ResultPanel,
        logs: &dyn HostLogBuffer,
        targets: &[&str],
    ) {
        let lines = logs.recent_lines(None);
        match contains_any(&lines, targets) {
            Some(matched) => {
                let message = format!("log entry found: {matched}");
                self.push_result(true, &[message], panel);
            }
            None => {
                warn!(targets = ?targets, "expected_log_entry_missing");
                let message = format!("can't find in log: {}", targets.join(", "));
                self.push_result(false, &[message], panel);
            }
        }
    }

    /// Empties the scrolling log field.
    pub fn clear_output(&self, panel: &mut dyn ResultPanel) {
        panel.clear_log();
    }
}

fn log_line(panel: &mut dyn ResultPanel, line: &str, tint: LogTint) {
    panel.append_log(line, tint);
    panel.scroll_to_end();
}

/// Pipe-joined outcome labels up to [`SUMMARY_ITEMIZED_LIMIT`] entries, then
/// collapsed counts so long histories stay readable without losing failures.
pub fn summarize_outcomes(outcomes: &[OutcomeRecord]) -> String {
    if outcomes.len() > SUMMARY_ITEMIZED_LIMIT {
        let passed = outcomes
            .iter()
            .filter(|record| record.outcome == Outcome::Pass)
            .count();
        let failed = outcomes.len() - passed;
        if failed > 0 {
            format!("Pass x {passed}, Failed x {failed}")
        } else {
            format!("Pass x {passed}")
        }
    } else {
        outcomes
            .iter()
            .map(|record| record.outcome.label())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}
