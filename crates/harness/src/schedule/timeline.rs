use std::time::Duration;

use super::{DelayedCommandSink, ScheduledCommand};

/// Reference delayed-execution sink: keeps commands ordered by offset and
/// hands over everything due when the driving loop polls it. Commands with
/// identical offsets keep insertion order, which is a detail of this sink
/// rather than a scheduling guarantee.
#[derive(Debug, Default)]
pub struct CommandTimeline {
    entries: Vec<ScheduledCommand>,
}

impl DelayedCommandSink for CommandTimeline {
    fn schedule(&mut self, command: ScheduledCommand) {
        let index = self.entries.partition_point(|entry| entry.at <= command.at);
        self.entries.insert(index, command);
    }
}

impl CommandTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset of the next pending command, if any.
    pub fn next_due(&self) -> Option<Duration> {
        self.entries.first().map(|entry| entry.at)
    }

    /// Moves every command with `at <= now` into `out`, in non-decreasing
    /// offset order. Returns how many were handed over.
    pub fn drain_due(&mut self, now: Duration, out: &mut Vec<ScheduledCommand>) -> usize {
        let due = self.entries.partition_point(|entry| entry.at <= now);
        out.extend(self.entries.drain(..due));
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RemoteCall;

    fn at(method: &str, millis: u64) -> ScheduledCommand {
        ScheduledCommand {
            call: RemoteCall::builtin("host", method),
            at: Duration::from_millis(millis),
        }
    }

    #[test]
    fn drains_in_non_decreasing_offset_order() {
        let mut timeline = CommandTimeline::new();
        timeline.schedule(at("c", 300));
        timeline.schedule(at("a", 100));
        timeline.schedule(at("b", 200));

        let mut out = Vec::new();
        let drained = timeline.drain_due(Duration::from_millis(250), &mut out);
        assert_eq!(drained, 2);
        assert_eq!(out[0].call.method, "a");
        assert_eq!(out[1].call.method, "b");
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.next_due(), Some(Duration::from_millis(300)));
    }

    #[test]
    fn identical_offsets_keep_insertion_order() {
        let mut timeline = CommandTimeline::new();
        timeline.schedule(at("first", 100));
        timeline.schedule(at("second", 100));
        timeline.schedule(at("third", 100));

        let mut out = Vec::new();
        timeline.drain_due(Duration::from_millis(100), &mut out);
        let methods: Vec<&str> = out.iter().map(|entry| entry.call.method.as_str()).collect();
        assert_eq!(methods, vec!["first", "second", "third"]);
    }

    #[test]
    fn drain_before_first_due_hands_over_nothing() {
        let mut timeline = CommandTimeline::new();
        timeline.schedule(at("later", 500));

        let mut out = Vec::new();
        assert_eq!(timeline.drain_due(Duration::from_millis(499), &mut out), 0);
        assert!(out.is_empty());
        assert!(!timeline.is_empty());
    }

    #[test]
    fn empty_timeline_reports_no_next_due() {
        let timeline = CommandTimeline::new();
        assert_eq!(timeline.next_due(), None);
        assert!(timeline.is_empty());
    }
}
