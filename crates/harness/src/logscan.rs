/// Marker for any error line in the host log.
pub const ERROR_MARKER: &str = "Error: ";
/// Marker for timestamped error lines, e.g. `[0042] Error: ...`.
pub const TIMESTAMPED_ERROR_MARKER: &str = "] Error:";

/// The host's rolling log buffer. `recent_lines(None)` returns everything
/// still buffered; a limit returns at most that many of the newest lines.
pub trait HostLogBuffer {
    fn recent_lines(&self, limit: Option<usize>) -> Vec<String>;
    fn clear(&mut self);
}

pub struct NoOpLogBuffer;

impl HostLogBuffer for NoOpLogBuffer {
    fn recent_lines(&self, _limit: Option<usize>) -> Vec<String> {
        Vec::new()
    }

    fn clear(&mut self) {}
}

pub fn error_line_count(lines: &[String]) -> usize {
    lines
        .iter()
        .filter(|line| line.contains(ERROR_MARKER))
        .count()
}

/// Lines carrying the timestamped error marker, for re-logging at category
/// end.
pub fn timestamped_error_lines(lines: &[String]) -> Vec<&str> {
    lines
        .iter()
        .filter(|line| line.contains(TIMESTAMPED_ERROR_MARKER))
        .map(String::as_str)
        .collect()
}

/// First target found in any line, if one matches.
pub fn contains_any<'t>(lines: &[String], targets: &[&'t str]) -> Option<&'t str> {
    for line in lines {
        for target in targets {
            if line.contains(target) {
                return Some(target);
            }
        }
    }
    None
}
