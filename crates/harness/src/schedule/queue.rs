use std::time::Duration;

use tracing::debug;

use crate::command::{ControllerHandle, RemoteCall};

use super::{DelayedCommandSink, ScheduledCommand};

/// Accumulates per-category relative delays into absolute offsets and hands
/// the resulting commands to the host's delayed-execution facility. Before
/// each real step it schedules a progress-status command at the step's start
/// offset so the UI advances while the step is still pending.
#[derive(Debug, Clone)]
pub struct DelayQueue {
    controller: ControllerHandle,
    elapsed: Duration,
    steps: u32,
}

impl DelayQueue {
    pub fn new(controller: ControllerHandle) -> Self {
        Self {
            controller,
            elapsed: Duration::ZERO,
            steps: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Schedules `call` at `elapsed + delay_from_previous` and returns the
    /// absolute offset it was scheduled at.
    pub fn enqueue(
        &mut self,
        sink: &mut dyn DelayedCommandSink,
        call: RemoteCall,
        delay_from_previous: Duration,
    ) -> Duration {
        let progress_at = self.elapsed;
        self.elapsed = self.elapsed.saturating_add(delay_from_previous);
        self.steps = self.steps.saturating_add(1);
        let at = self.elapsed;

        let progress_text = format!(
            "process: step {} @ {:.1}s...",
            self.steps,
            at.as_secs_f64()
        );
        let progress = RemoteCall::controller(&self.controller, "set_output").arg(progress_text);

        debug!(
            step = self.steps,
            at_ms = at.as_millis() as u64,
            command = %call.render_wire(),
            "command_enqueued"
        );
        sink.schedule(ScheduledCommand {
            call: progress,
            at: progress_at,
        });
        sink.schedule(ScheduledCommand { call, at });
        at
    }
}
