use std::time::Duration;

use harness::{
    HostLogBuffer, RemoteCall, ResultPanel, TestSession,
};

use super::edport::Edport;

const DEMO_CATEGORY_ID: u32 = 0;

fn millis(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Enqueues the built-in demo category: a probe-file dialog round-trip, a
/// notification with snapshot capture and text assertion, and a host-log
/// error check, closed by the trailing end command.
pub(crate) fn enqueue_demo_category(
    session: &mut TestSession,
    timeline: &mut harness::CommandTimeline,
    panel: &mut dyn ResultPanel,
    logs: &mut dyn HostLogBuffer,
) {
    if !session
        .begin(DEMO_CATEGORY_ID, panel, logs)
        .started()
    {
        return;
    }
    let ctrl = session.controller().clone();

    session.note(panel, "probe file dialog round-trip");
    session.push_call(
        timeline,
        RemoteCall::controller(&ctrl, "probe_round_trip").kwarg("token", "Test"),
        millis(100),
    );

    session.note(panel, "notification capture and text assertion");
    let label = "This is a notification";
    session.push_call(
        timeline,
        RemoteCall::builtin("host", "notify").kwarg("message", label),
        millis(100),
    );
    session.push_call(
        timeline,
        RemoteCall::builtin("host", "capture_snapshot").arg("demo"),
        millis(300),
    );
    session.push_call(
        timeline,
        RemoteCall::controller(&ctrl, "assert_snap_text")
            .arg(label)
            .arg(false)
            .kwarg("age_limit", 5.0f64),
        millis(200),
    );
    session.push_call(
        timeline,
        RemoteCall::controller(&ctrl, "check_log_contains").arg("notification shown"),
        millis(100),
    );

    session.note(panel, "host log error scan");
    session.push_call(
        timeline,
        RemoteCall::controller(&ctrl, "check_error_log"),
        millis(100),
    );

    session.finish(DEMO_CATEGORY_ID, timeline);
}

/// Sends the classification of an executed command to connected edport
/// clients: progress updates on the progress channel, everything else as a
/// result line.
pub(crate) fn relay_executed_command(port: &mut Edport, wire: &str, is_progress: bool) {
    if is_progress {
        port.send_progress_line(wire);
    } else {
        port.send_result_line(&format!("ok: {wire}"));
    }
}
