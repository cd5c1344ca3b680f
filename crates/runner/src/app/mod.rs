use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::warn;

use harness::{CommandTimeline, DelayedCommandSink, ScheduledCommand, TestSession};

mod bootstrap;
mod cases;
mod edport;
mod host_log;
mod interp;
mod journal;
mod panel;

use edport::{Edport, RemoteRequest};
use host_log::VecLogBuffer;
use interp::InterpContext;
use panel::TerminalPanel;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
pub(crate) enum RunnerError {
    #[error(transparent)]
    Config(#[from] harness::ConfigError),
    #[error("failed to load runner config: {0}")]
    LoadConfig(String),
    #[error("failed to write session journal: {0}")]
    Journal(String),
}

pub(crate) fn run() -> Result<(), RunnerError> {
    let wiring = bootstrap::build_runner()?;

    let mut panel = TerminalPanel::new();
    let mut logs = VecLogBuffer::new();
    let mut timeline = CommandTimeline::new();
    let mut session = TestSession::new(wiring.controller.clone());
    let mut port = Edport::initialize(wiring.config.edport_enabled, wiring.config.edport_port);
    let mut ctx = InterpContext::new(wiring.paths.clone());

    if wiring.config.run_demo {
        cases::enqueue_demo_category(&mut session, &mut timeline, &mut panel, &mut logs);
    }

    let epoch = Instant::now();
    let mut due = Vec::new();
    let mut requests = Vec::new();
    let mut journaled_reports = 0usize;

    loop {
        let now = epoch.elapsed();

        port.poll_requests(&mut requests);
        for request in requests.drain(..) {
            match request {
                RemoteRequest::After { delay, command } => {
                    match interp::call_from_line(&command, session.controller()) {
                        Ok(call) => timeline.schedule(ScheduledCommand {
                            call,
                            at: now + delay,
                        }),
                        Err(reason) => {
                            warn!(command = %command, reason = %reason, "remote_command_rejected");
                            logs.push_error(&reason);
                            port.send_result_line(&format!("error: {reason}"));
                        }
                    }
                }
                RemoteRequest::Sync => {
                    // Acknowledged below once the timeline drains.
                }
            }
        }

        timeline.drain_due(now, &mut due);
        for command in due.drain(..) {
            let wire = command.call.render_wire();
            let is_progress = command.call.method == "set_output";
            match interp::execute_call(command.call, &mut session, &mut panel, &mut logs, &mut ctx)
            {
                Ok(()) => cases::relay_executed_command(&mut port, &wire, is_progress),
                Err(reason) => {
                    warn!(command = %wire, reason = %reason, "command_execution_failed");
                    logs.push_error(&reason);
                    port.send_result_line(&format!("error: {reason}"));
                }
            }
        }

        if ctx.reports.len() > journaled_reports {
            journal::write_session_journal(&wiring.paths.root, &ctx.reports)
                .map_err(RunnerError::Journal)?;
            journaled_reports = ctx.reports.len();
        }

        let drained = timeline.is_empty();
        port.acknowledge_syncs_when_idle(drained);

        if drained && !session.is_open() && !port.is_enabled() {
            break;
        }

        match timeline.next_due() {
            Some(next) if next > now => thread::sleep((next - now).min(POLL_INTERVAL)),
            Some(_) => {}
            None => thread::sleep(POLL_INTERVAL),
        }
    }

    Ok(())
}
