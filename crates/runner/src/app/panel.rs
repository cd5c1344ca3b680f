use std::collections::BTreeMap;

use harness::{LogTint, OutcomeColor, ResultPanel};

const ANSI_RESET: &str = "\x1b[0m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_ORANGE: &str = "\x1b[33m";

/// Result panel over the runner's terminal: field writes render as
/// `[field] text` lines colorized by the field's last assigned color, log
/// lines by their tint.
pub(crate) struct TerminalPanel {
    colors: BTreeMap<String, OutcomeColor>,
    use_color: bool,
}

impl TerminalPanel {
    pub(crate) fn new() -> Self {
        Self {
            colors: BTreeMap::new(),
            use_color: true,
        }
    }

    #[cfg(test)]
    fn plain() -> Self {
        Self {
            colors: BTreeMap::new(),
            use_color: false,
        }
    }

    fn paint(&self, text: &str, ansi: &str) -> String {
        if self.use_color && !ansi.is_empty() {
            format!("{ansi}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn field_line(&self, field: &str, text: &str) -> String {
        let ansi = match self.colors.get(field) {
            Some(OutcomeColor::Green) => ANSI_GREEN,
            Some(OutcomeColor::Orange) => ANSI_ORANGE,
            Some(OutcomeColor::Red) => ANSI_RED,
            Some(OutcomeColor::White) | None => "",
        };
        self.paint(&format!("[{field}] {text}"), ansi)
    }

    fn log_ansi(tint: LogTint) -> &'static str {
        match tint {
            LogTint::Plain => "",
            LogTint::Orange => ANSI_ORANGE,
            LogTint::Red => ANSI_RED,
            LogTint::Green => ANSI_GREEN,
        }
    }
}

impl ResultPanel for TerminalPanel {
    fn set_text(&mut self, field: &str, text: &str) {
        println!("{}", self.field_line(field, text));
    }

    fn set_color(&mut self, field: &str, color: OutcomeColor) {
        self.colors.insert(field.to_string(), color);
    }

    fn append_log(&mut self, line: &str, tint: LogTint) {
        println!("{}", self.paint(line, Self::log_ansi(tint)));
    }

    fn clear_log(&mut self) {
        println!("{}", "-".repeat(40));
    }

    fn scroll_to_end(&mut self) {
        // The terminal scrolls on its own.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_lines_use_last_assigned_color() {
        let mut panel = TerminalPanel::new();
        panel.set_color("ResultBox_0", OutcomeColor::Red);
        assert_eq!(
            panel.field_line("ResultBox_0", "FAILED"),
            "\x1b[31m[ResultBox_0] FAILED\x1b[0m"
        );
        assert_eq!(panel.field_line("Output", "Done. ID 0"), "[Output] Done. ID 0");
    }

    #[test]
    fn plain_mode_emits_no_escape_codes() {
        let mut panel = TerminalPanel::plain();
        panel.set_color("ResultBox_0", OutcomeColor::Green);
        assert_eq!(panel.field_line("ResultBox_0", "PASS"), "[ResultBox_0] PASS");
        assert_eq!(panel.paint("hello", ANSI_RED), "hello");
    }
}
