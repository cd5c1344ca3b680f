use std::collections::BTreeMap;

/// Free-form status text field.
pub const OUTPUT_FIELD: &str = "Output";
/// Rich-text scrolling log field.
pub const LOG_FIELD: &str = "OutputLog";

/// Compact per-category result field id.
pub fn result_box_field(id: u32) -> String {
    format!("ResultBox_{id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeColor {
    White,
    Green,
    Orange,
    Red,
}

impl OutcomeColor {
    pub fn rgba(self) -> [u8; 4] {
        match self {
            OutcomeColor::White => [255, 255, 255, 255],
            OutcomeColor::Green => [0, 255, 0, 255],
            OutcomeColor::Orange => [255, 128, 0, 255],
            OutcomeColor::Red => [255, 0, 0, 255],
        }
    }
}

/// Derives a display color from result text. On the lower-cased text:
/// "error" or "failed" present means orange when "pass" is also present,
/// red otherwise; absent, "pass" means green; anything else stays white.
pub fn outcome_color(result_text: &str) -> OutcomeColor {
    let lower = result_text.to_lowercase();
    let has_pass = lower.contains("pass");
    let has_failure = lower.contains("error") || lower.contains("failed");

    if has_failure {
        if has_pass {
            OutcomeColor::Orange
        } else {
            OutcomeColor::Red
        }
    } else if has_pass {
        OutcomeColor::Green
    } else {
        OutcomeColor::White
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTint {
    Plain,
    Orange,
    Red,
    Green,
}

/// Wraps a log line in the host's rich-text markup for its tint.
pub fn rich_markup(line: &str, tint: LogTint) -> String {
    match tint {
        LogTint::Plain => line.to_string(),
        LogTint::Orange => format!("<RichText.orange>{line}</>"),
        LogTint::Red => format!("<RichText.red>{line}</>"),
        LogTint::Green => format!("<RichText.green>{line}</>"),
    }
}

/// Host UI surface the aggregator writes into: one free-form status field,
/// one scrolling log, and per-category result boxes.
pub trait ResultPanel {
    fn set_text(&mut self, field: &str, text: &str);
    fn set_color(&mut self, field: &str, color: OutcomeColor);
    fn append_log(&mut self, line: &str, tint: LogTint);
    fn clear_log(&mut self);
    fn scroll_to_end(&mut self);
}

pub struct NoOpPanel;

impl ResultPanel for NoOpPanel {
    fn set_text(&mut self, _field: &str, _text: &str) {}
    fn set_color(&mut self, _field: &str, _color: OutcomeColor) {}
    fn append_log(&mut self, _line: &str, _tint: LogTint) {}
    fn clear_log(&mut self) {}
    fn scroll_to_end(&mut self) {}
}

/// In-memory panel modelling the host's text fields: keeps field text,
/// field colors, and a rich-markup log buffer. Used by embedders without a
/// real UI and by tests.
#[derive(Debug, Default)]
pub struct RecordingPanel {
    fields: BTreeMap<String, String>,
    colors: BTreeMap<String, OutcomeColor>,
    log: String,
    scroll_requests: u32,
}

impl RecordingPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn color(&self, field: &str) -> Option<OutcomeColor> {
        self.colors.get(field).copied()
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn scroll_requests(&self) -> u32 {
        self.scroll_requests
    }
}

impl ResultPanel for RecordingPanel {
    fn set_text(&mut self, field: &str, text: &str) {
        self.fields.insert(field.to_string(), text.to_string());
    }

    fn set_color(&mut self, field: &str, color: OutcomeColor) {
        self.colors.insert(field.to_string(), color);
    }

    fn append_log(&mut self, line: &str, tint: LogTint) {
        if !self.log.is_empty() {
            self.log.push('\n');
        }
        self.log.push_str(&rich_markup(line, tint));
    }

    fn clear_log(&mut self) {
        self.log.clear();
    }

    fn scroll_to_end(&mut self) {
        self.scroll_requests = self.scroll_requests.saturating_add(1);
    }
}
