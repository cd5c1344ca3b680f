use std::fs;
use std::time::Duration;

use tracing::{info, warn};

use harness::{
    assert_text, dedupe_identical, latest_snapshots, parse_wire_call, read_probe_token,
    snapshot_dimensions, write_probe_file, CallArg, CallTarget, CategoryReport, CommandEnvelope,
    ControllerHandle, HarnessPaths, RemoteCall, ResultPanel, TestSession,
};

use super::host_log::VecLogBuffer;

const HOST_NAMESPACE: &str = "host";
const PROBE_FILE_NAME: &str = "dialog_probe.txt";
const SNAP_GROUP_THRESHOLD: Duration = Duration::from_secs(1);

pub(crate) struct InterpContext {
    pub(crate) paths: HarnessPaths,
    pub(crate) capture_index: u32,
    pub(crate) reports: Vec<CategoryReport>,
}

impl InterpContext {
    pub(crate) fn new(paths: HarnessPaths) -> Self {
        Self {
            paths,
            capture_index: 0,
            reports: Vec::new(),
        }
    }
}

/// Decodes one submitted command line: a JSON command envelope when the line
/// opens with `{`, the call-string form otherwise. The parsed target is
/// classified against the controller instance.
pub(crate) fn call_from_line(
    line: &str,
    controller: &ControllerHandle,
) -> Result<RemoteCall, String> {
    let trimmed = line.trim();
    if trimmed.starts_with('{') {
        return CommandEnvelope::decode_json(trimmed)
            .map(CommandEnvelope::into_call)
            .map_err(|error| error.to_string());
    }

    let parsed = parse_wire_call(trimmed).map_err(|error| error.to_string())?;
    let target = if parsed.targets_instance(controller) {
        CallTarget::Controller {
            instance: parsed.target,
        }
    } else {
        CallTarget::Builtin {
            namespace: parsed.target,
        }
    };
    Ok(RemoteCall {
        target,
        method: parsed.method,
        args: parsed.args,
        kwargs: parsed.kwargs,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum HarnessOp {
    Begin { id: u32 },
    End { id: u32 },
    PushResult { succ: bool, messages: Vec<String> },
    SetOutput { text: String },
    Note { message: String },
    CheckErrorLog,
    CheckLogContains { targets: Vec<String> },
    ClearOutput,
    ProbeRoundTrip { token: String },
    AssertSnapText {
        target: String,
        strict: bool,
        age_limit_seconds: f64,
    },
    HostLog { message: String },
    HostNotify { message: String },
    HostCapture { name: String },
}

struct ArgReader<'c> {
    call: &'c RemoteCall,
}

impl<'c> ArgReader<'c> {
    fn kwarg(&self, name: &str) -> Option<&'c CallArg> {
        self.call
            .kwargs
            .iter()
            .find(|(kwarg, _)| kwarg == name)
            .map(|(_, value)| value)
    }

    fn get(&self, index: usize, name: &str) -> Option<&'c CallArg> {
        self.call.args.get(index).or_else(|| self.kwarg(name))
    }

    fn str_req(&self, index: usize, name: &str, usage: &str) -> Result<String, String> {
        match self.get(index, name) {
            Some(CallArg::Str(value)) => Ok(value.clone()),
            Some(_) => Err(format!(
                "invalid argument <{name}> (expected string). usage: {usage}"
            )),
            None => Err(format!(
                "missing required argument <{name}>. usage: {usage}"
            )),
        }
    }

    fn id_req(&self, index: usize, name: &str, usage: &str) -> Result<u32, String> {
        match self.get(index, name) {
            Some(CallArg::Int(value)) if *value >= 0 => Ok(*value as u32),
            Some(_) => Err(format!(
                "invalid argument <{name}> (expected non-negative integer). usage: {usage}"
            )),
            None => Err(format!(
                "missing required argument <{name}>. usage: {usage}"
            )),
        }
    }

    fn bool_req(&self, index: usize, name: &str, usage: &str) -> Result<bool, String> {
        match self.get(index, name) {
            Some(CallArg::Bool(value)) => Ok(*value),
            Some(_) => Err(format!(
                "invalid argument <{name}> (expected bool). usage: {usage}"
            )),
            None => Err(format!(
                "missing required argument <{name}>. usage: {usage}"
            )),
        }
    }

    fn bool_opt(&self, index: usize, name: &str, default: bool, usage: &str) -> Result<bool, String> {
        match self.get(index, name) {
            Some(CallArg::Bool(value)) => Ok(*value),
            Some(_) => Err(format!(
                "invalid argument <{name}> (expected bool). usage: {usage}"
            )),
            None => Ok(default),
        }
    }

    fn seconds_opt(
        &self,
        index: usize,
        name: &str,
        default: f64,
        usage: &str,
    ) -> Result<f64, String> {
        match self.get(index, name) {
            Some(CallArg::Float(value)) => Ok(*value),
            Some(CallArg::Int(value)) => Ok(*value as f64),
            Some(_) => Err(format!(
                "invalid argument <{name}> (expected seconds). usage: {usage}"
            )),
            None => Ok(default),
        }
    }
}

fn parse_op(call: &RemoteCall, controller: &ControllerHandle) -> Result<HarnessOp, String> {
    let path = call.target.path();
    let reader = ArgReader { call };

    if path == controller.instance() {
        return match call.method.as_str() {
            "begin" => Ok(HarnessOp::Begin {
                id: reader.id_req(0, "id", "begin(<id>)")?,
            }),
            "end" => Ok(HarnessOp::End {
                id: reader.id_req(0, "id", "end(id=<id>)")?,
            }),
            "push_result" => {
                let usage = "push_result(<succ>, [messages...])";
                let succ = reader.bool_req(0, "succ", usage)?;
                let mut messages = Vec::new();
                for arg in call.args.iter().skip(1) {
                    match arg {
                        CallArg::Str(message) => messages.push(message.clone()),
                        _ => {
                            return Err(format!(
                                "invalid trailing argument (expected string message). usage: {usage}"
                            ))
                        }
                    }
                }
                if let Some(CallArg::Str(message)) = reader.kwarg("msg") {
                    messages.push(message.clone());
                }
                Ok(HarnessOp::PushResult { succ, messages })
            }
            "set_output" => Ok(HarnessOp::SetOutput {
                text: reader.str_req(0, "text", "set_output(<text>)")?,
            }),
            "note" => Ok(HarnessOp::Note {
                message: reader.str_req(0, "message", "note(<message>)")?,
            }),
            "check_error_log" => Ok(HarnessOp::CheckErrorLog),
            "check_log_contains" => {
                let usage = "check_log_contains(<target>, [more targets...])";
                let mut targets = Vec::new();
                for arg in &call.args {
                    match arg {
                        CallArg::Str(target) => targets.push(target.clone()),
                        _ => {
                            return Err(format!(
                                "invalid argument (expected string target). usage: {usage}"
                            ))
                        }
                    }
                }
                if targets.is_empty() {
                    return Err(format!(
                        "missing required argument <target>. usage: {usage}"
                    ));
                }
                Ok(HarnessOp::CheckLogContains { targets })
            }
            "clear_output" => Ok(HarnessOp::ClearOutput),
            "probe_round_trip" => Ok(HarnessOp::ProbeRoundTrip {
                token: reader.str_req(0, "token", "probe_round_trip(token=<token>)")?,
            }),
            "assert_snap_text" => {
                let usage = "assert_snap_text(<target>, [strict], [age_limit])";
                Ok(HarnessOp::AssertSnapText {
                    target: reader.str_req(0, "target", usage)?,
                    strict: reader.bool_opt(1, "strict", false, usage)?,
                    age_limit_seconds: reader.seconds_opt(2, "age_limit", 5.0, usage)?,
                })
            }
            other => Err(format!("unknown controller method '{other}'")),
        };
    }

    if path == HOST_NAMESPACE {
        return match call.method.as_str() {
            "log" => Ok(HarnessOp::HostLog {
                message: reader.str_req(0, "message", "host.log(<message>)")?,
            }),
            "notify" => Ok(HarnessOp::HostNotify {
                message: reader.str_req(0, "message", "host.notify(message=<message>)")?,
            }),
            "capture_snapshot" => Ok(HarnessOp::HostCapture {
                name: reader.str_req(0, "name", "host.capture_snapshot(<name>)")?,
            }),
            other => Err(format!("unknown host builtin '{other}'")),
        };
    }

    Err(format!("unknown command target '{path}'"))
}

/// Executes one due command against the session. Assertion failures become
/// FAILED outcomes inside; only op-level problems (unknown target or method,
/// bad arguments) surface as errors.
pub(crate) fn execute_call(
    call: RemoteCall,
    session: &mut TestSession,
    panel: &mut dyn ResultPanel,
    logs: &mut VecLogBuffer,
    ctx: &mut InterpContext,
) -> Result<(), String> {
    let controller = session.controller().clone();
    let op = parse_op(&call, &controller)?;

    match op {
        HarnessOp::Begin { id } => {
            let _ = session.begin(id, panel, logs);
        }
        HarnessOp::End { id } => {
            let report = session.end(id, panel, logs);
            ctx.reports.push(report);
        }
        HarnessOp::PushResult { succ, messages } => {
            session.push_result(succ, &messages, panel);
        }
        HarnessOp::SetOutput { text } => {
            session.set_output(panel, &text);
        }
        HarnessOp::Note { message } => {
            session.note(panel, &message);
        }
        HarnessOp::CheckErrorLog => {
            session.check_error_in_log(panel, logs);
        }
        HarnessOp::CheckLogContains { targets } => {
            let borrowed: Vec<&str> = targets.iter().map(String::as_str).collect();
            session.check_log_contains(panel, logs, &borrowed);
        }
        HarnessOp::ClearOutput => {
            session.clear_output(panel);
        }
        HarnessOp::ProbeRoundTrip { token } => {
            execute_probe_round_trip(&token, session, panel, logs, ctx);
        }
        HarnessOp::AssertSnapText {
            target,
            strict,
            age_limit_seconds,
        } => {
            execute_snap_assertion(&target, strict, age_limit_seconds, session, panel, ctx);
        }
        HarnessOp::HostLog { message } => {
            info!(message = %message, "host_log");
            logs.push_info(&message);
        }
        HarnessOp::HostNotify { message } => {
            info!(message = %message, "host_notification");
            logs.push_info(&format!("notification shown: {message}"));
        }
        HarnessOp::HostCapture { name } => {
            execute_capture(&name, logs, ctx);
        }
    }
    Ok(())
}

fn execute_probe_round_trip(
    token: &str,
    session: &mut TestSession,
    panel: &mut dyn ResultPanel,
    logs: &mut VecLogBuffer,
    ctx: &mut InterpContext,
) {
    let path = ctx.paths.probe_dir.join(PROBE_FILE_NAME);
    let round_trip = write_probe_file(&path, token).and_then(|_| read_probe_token(&path));
    match round_trip {
        Ok(read_back) if read_back == token => {
            let message = format!("probe file round-trip ok: {}", path.display());
            session.push_result(true, &[message], panel);
        }
        Ok(read_back) => {
            let message =
                format!("probe token mismatch: wrote \"{token}\", read \"{read_back}\"");
            session.push_result(false, &[message], panel);
        }
        Err(error) => {
            logs.push_error(&error.to_string());
            session.push_result(false, &[error.to_string()], panel);
        }
    }
}

fn execute_snap_assertion(
    target: &str,
    strict: bool,
    age_limit_seconds: f64,
    session: &mut TestSession,
    panel: &mut dyn ResultPanel,
    ctx: &mut InterpContext,
) {
    let limit = if age_limit_seconds > 0.0 {
        Some(Duration::from_secs_f64(age_limit_seconds))
    } else {
        None
    };
    let group = latest_snapshots(&ctx.paths.snapshot_dir, limit, SNAP_GROUP_THRESHOLD);
    let group = dedupe_identical(&group);
    if group.len() > 1 {
        info!(group_len = group.len(), "multiple_snapshots_in_group");
    }

    let snapshot = group.first().cloned().unwrap_or_default();
    if let Some((width, height)) = snapshot_dimensions(&snapshot) {
        info!(path = %snapshot.display(), width, height, "snapshot_selected");
    }

    let verdict = assert_text(&snapshot, target, strict);
    let acceptable = verdict.acceptable();
    if !acceptable {
        warn!(expected = target, strict, verdict = %verdict, "snapshot_text_assertion_failed");
    }
    session.push_result(acceptable, &[verdict.to_string()], panel);
}

fn execute_capture(name: &str, logs: &mut VecLogBuffer, ctx: &mut InterpContext) {
    ctx.capture_index = ctx.capture_index.saturating_add(1);
    if let Err(error) = fs::create_dir_all(&ctx.paths.snapshot_dir) {
        logs.push_error(&format!(
            "create snapshot dir {}: {error}",
            ctx.paths.snapshot_dir.display()
        ));
        return;
    }

    let file = ctx
        .paths
        .snapshot_dir
        .join(format!("{name}_{:05}.png", ctx.capture_index));
    let placeholder = image::RgbaImage::from_pixel(64, 36, image::Rgba([24, 24, 32, 255]));
    match placeholder.save(&file) {
        Ok(()) => {
            info!(path = %file.display(), "snapshot_captured");
            logs.push_info(&format!("snapshot captured: {}", file.display()));
        }
        Err(error) => {
            logs.push_error(&format!("capture failed at {}: {error}", file.display()));
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use harness::RecordingPanel;

    use super::*;

    fn controller() -> ControllerHandle {
        ControllerHandle::new("ctrl").expect("handle")
    }

    fn context(temp: &TempDir) -> InterpContext {
        InterpContext::new(HarnessPaths {
            root: temp.path().to_path_buf(),
            snapshot_dir: temp.path().join("screenshots"),
            probe_dir: temp.path().join("probes"),
        })
    }

    fn run_line(
        line: &str,
        session: &mut TestSession,
        panel: &mut RecordingPanel,
        logs: &mut VecLogBuffer,
        ctx: &mut InterpContext,
    ) -> Result<(), String> {
        let call = call_from_line(line, session.controller())?;
        execute_call(call, session, panel, logs, ctx)
    }

    #[test]
    fn wire_and_envelope_forms_decode_to_the_same_call() {
        let from_wire = call_from_line("ctrl.begin(0)", &controller()).expect("wire");
        let envelope = CommandEnvelope::from_call(&from_wire)
            .encode_json()
            .expect("encode");
        let from_envelope = call_from_line(&envelope, &controller()).expect("envelope");
        assert_eq!(from_wire, from_envelope);
    }

    #[test]
    fn unknown_targets_and_methods_are_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let mut session = TestSession::new(controller());
        let mut panel = RecordingPanel::new();
        let mut logs = VecLogBuffer::new();
        let mut ctx = context(&temp);

        let unknown_target = run_line(
            "somebody_else.begin(0)",
            &mut session,
            &mut panel,
            &mut logs,
            &mut ctx,
        );
        assert_eq!(
            unknown_target,
            Err("unknown command target 'somebody_else'".to_string())
        );

        run_line("ctrl.begin(0)", &mut session, &mut panel, &mut logs, &mut ctx)
            .expect("begin");
        let unknown_method = run_line(
            "ctrl.does_not_exist()",
            &mut session,
            &mut panel,
            &mut logs,
            &mut ctx,
        );
        assert_eq!(
            unknown_method,
            Err("unknown controller method 'does_not_exist'".to_string())
        );
    }

    #[test]
    fn bad_arguments_carry_usage_hints() {
        let error = parse_op(
            &call_from_line("ctrl.begin(\"zero\")", &controller()).expect("parse"),
            &controller(),
        )
        .expect_err("should fail");
        assert_eq!(
            error,
            "invalid argument <id> (expected non-negative integer). usage: begin(<id>)"
        );
    }

    #[test]
    fn category_flow_executes_and_reports() {
        let temp = TempDir::new().expect("tempdir");
        let mut session = TestSession::new(controller());
        let mut panel = RecordingPanel::new();
        let mut logs = VecLogBuffer::new();
        let mut ctx = context(&temp);

        for line in [
            "ctrl.begin(7)",
            "ctrl.note(\"first step\")",
            "ctrl.push_result(true, \"step ok\")",
            "host.log(\"host side effect\")",
            "ctrl.check_log_contains(\"host side effect\")",
            "ctrl.check_error_log()",
            "ctrl.end(id=7)",
        ] {
            run_line(line, &mut session, &mut panel, &mut logs, &mut ctx)
                .unwrap_or_else(|error| panic!("line '{line}' failed: {error}"));
        }

        assert!(!session.is_open());
        assert_eq!(ctx.reports.len(), 1);
        assert_eq!(ctx.reports[0].id, 7);
        assert_eq!(ctx.reports[0].summary, "PASS | PASS | PASS");
        assert_eq!(panel.text("Output"), Some("Done. ID 7"));
    }

    #[test]
    fn probe_round_trip_passes_and_reuses_probe_dir() {
        let temp = TempDir::new().expect("tempdir");
        let mut session = TestSession::new(controller());
        let mut panel = RecordingPanel::new();
        let mut logs = VecLogBuffer::new();
        let mut ctx = context(&temp);

        run_line("ctrl.begin(1)", &mut session, &mut panel, &mut logs, &mut ctx)
            .expect("begin");
        run_line(
            "ctrl.probe_round_trip(token=\"Test\")",
            &mut session,
            &mut panel,
            &mut logs,
            &mut ctx,
        )
        .expect("probe");

        assert_eq!(panel.text("ResultBox_1"), Some("PASS"));
        assert!(panel.log().contains("probe file round-trip ok"));
    }

    // The recognizer-unavailable check comes before the path check, so a
    // missing snapshot still soft-skips when no recognizer is installed.
    #[test]
    fn snap_assertion_missing_snapshot_still_soft_skips() {
        let temp = TempDir::new().expect("tempdir");
        let mut session = TestSession::new(controller());
        let mut panel = RecordingPanel::new();
        let mut logs = VecLogBuffer::new();
        let mut ctx = context(&temp);

        run_line("ctrl.begin(2)", &mut session, &mut panel, &mut logs, &mut ctx)
            .expect("begin");
        run_line(
            "ctrl.assert_snap_text(\"Hello\", false, 0)",
            &mut session,
            &mut panel,
            &mut logs,
            &mut ctx,
        )
        .expect("assert");

        assert_eq!(panel.text("ResultBox_2"), Some("PASS"));
        assert!(panel
            .log()
            .contains("Warning: text recognizer not installed"));
    }

    #[test]
    fn capture_then_assert_soft_skips_without_recognizer() {
        let temp = TempDir::new().expect("tempdir");
        let mut session = TestSession::new(controller());
        let mut panel = RecordingPanel::new();
        let mut logs = VecLogBuffer::new();
        let mut ctx = context(&temp);

        run_line("ctrl.begin(3)", &mut session, &mut panel, &mut logs, &mut ctx)
            .expect("begin");
        run_line(
            "host.capture_snapshot(\"demo\")",
            &mut session,
            &mut panel,
            &mut logs,
            &mut ctx,
        )
        .expect("capture");
        assert_eq!(ctx.capture_index, 1);
        assert!(ctx.paths.snapshot_dir.join("demo_00001.png").is_file());

        run_line(
            "ctrl.assert_snap_text(\"anything\", false, 0)",
            &mut session,
            &mut panel,
            &mut logs,
            &mut ctx,
        )
        .expect("assert");

        // No recognizer installed in this process: soft skip, not a failure.
        assert_eq!(panel.text("ResultBox_3"), Some("PASS"));
        assert!(panel
            .log()
            .contains("Warning: text recognizer not installed"));
    }
}
