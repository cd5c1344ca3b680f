mod queue;
mod timeline;

pub use queue::DelayQueue;
pub use timeline::CommandTimeline;

use std::time::Duration;

use crate::command::RemoteCall;

/// A command bound to an absolute offset from the enqueue epoch. Created by
/// the delay queue and consumed exactly once by the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledCommand {
    pub call: RemoteCall,
    pub at: Duration,
}

/// The host-provided delayed-execution facility. Once a command is handed
/// over it is not revocable.
pub trait DelayedCommandSink {
    fn schedule(&mut self, command: ScheduledCommand);
}

pub struct NoOpCommandSink;

impl DelayedCommandSink for NoOpCommandSink {
    fn schedule(&mut self, _command: ScheduledCommand) {}
}
