use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_PORT: u16 = 46101;
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RETRY_MS: u64 = 100;
pub const DEFAULT_QUIET_MS: u64 = 250;
const MAX_RETRY_BACKOFF_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineChannel {
    Result,
    Progress,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub channel: LineChannel,
    pub payload: String,
}

#[derive(Debug, Clone, Copy)]
pub struct CommonOptions {
    pub port: u16,
    pub timeout_ms: u64,
    pub retry_ms: u64,
    pub include_progress: bool,
}

impl Default for CommonOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_ms: DEFAULT_RETRY_MS,
            include_progress: false,
        }
    }
}

pub enum CommandKind {
    WaitReady,
    Send { command: String, after_ms: u64 },
    Script { path: String, barrier: bool },
    Barrier,
}

/// One step of a script file: a command plus its delay from the previous
/// step.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    pub delay_seconds: f64,
    pub command: String,
}

struct Session {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

pub fn parse_wire_line(raw: &str) -> ParsedLine {
    let trimmed = raw.trim_end_matches(['\r', '\n']);
    if let Some(payload) = trimmed.strip_prefix("R ") {
        return ParsedLine {
            channel: LineChannel::Result,
            payload: payload.to_string(),
        };
    }
    if let Some(payload) = trimmed.strip_prefix("P ") {
        return ParsedLine {
            channel: LineChannel::Progress,
            payload: payload.to_string(),
        };
    }
    ParsedLine {
        channel: LineChannel::Unknown,
        payload: trimmed.to_string(),
    }
}

pub fn should_print_line(line: &ParsedLine, include_progress: bool) -> bool {
    match line.channel {
        LineChannel::Result => true,
        LineChannel::Progress => include_progress,
        LineChannel::Unknown => false,
    }
}

pub fn is_ready_payload(payload: &str) -> bool {
    payload.starts_with("edport.ready v1 port:")
}

pub fn is_sync_ok_payload(payload: &str) -> bool {
    payload == "ok: sync"
}

/// Renders one submission line: `after <ms> <command>`.
pub fn submit_line(command: &str, after_ms: u64) -> String {
    format!("after {after_ms} {command}")
}

/// Parses a script file: one command per line, an optional `+<seconds>`
/// delay prefix, `#` comments and blanks ignored.
pub fn parse_script_steps(content: &str) -> Result<Vec<ScriptStep>, String> {
    let mut steps = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (delay_seconds, command) = match trimmed.strip_prefix('+') {
            Some(rest) => {
                let Some((delay_text, command)) = rest.split_once(' ') else {
                    return Err(format!(
                        "line {}: missing command after delay prefix '{trimmed}'",
                        index + 1
                    ));
                };
                let delay = delay_text.parse::<f64>().map_err(|_| {
                    format!(
                        "line {}: invalid delay '+{delay_text}' (expected seconds)",
                        index + 1
                    )
                })?;
                if delay < 0.0 {
                    return Err(format!(
                        "line {}: negative delay '+{delay_text}'",
                        index + 1
                    ));
                }
                (delay, command.trim())
            }
            None => (0.0, trimmed),
        };
        if command.is_empty() {
            return Err(format!("line {}: empty command", index + 1));
        }
        steps.push(ScriptStep {
            delay_seconds,
            command: command.to_string(),
        });
    }
    Ok(steps)
}

pub fn run<W: Write>(kind: CommandKind, opts: CommonOptions, stdout: &mut W) -> Result<(), String> {
    let timeout = Duration::from_millis(opts.timeout_ms);
    let retry_base = Duration::from_millis(opts.retry_ms.max(1));
    let mut session = connect_and_wait_ready(opts.port, timeout, retry_base, |line| {
        emit_line(stdout, line, opts.include_progress)
    })?;

    match kind {
        CommandKind::WaitReady => Ok(()),
        CommandKind::Send { command, after_ms } => {
            send_line(&mut session.writer, &submit_line(&command, after_ms))?;
            read_until_quiet(
                &mut session.reader,
                timeout,
                Duration::from_millis(DEFAULT_QUIET_MS),
                |line| emit_line(stdout, line, opts.include_progress),
            )
        }
        CommandKind::Script { path, barrier } => {
            let content = fs::read_to_string(&path)
                .map_err(|error| format!("failed to read script file '{path}': {error}"))?;
            let steps = parse_script_steps(&content)?;
            let mut offset_ms = 0u64;
            for step in steps {
                offset_ms = offset_ms.saturating_add((step.delay_seconds * 1000.0) as u64);
                send_line(&mut session.writer, &submit_line(&step.command, offset_ms))?;
            }
            read_until_quiet(
                &mut session.reader,
                timeout,
                Duration::from_millis(DEFAULT_QUIET_MS),
                |line| emit_line(stdout, line, opts.include_progress),
            )?;
            if barrier {
                send_barrier_and_wait_ack(&mut session, timeout, |line| {
                    emit_line(stdout, line, opts.include_progress)
                })?;
            }
            Ok(())
        }
        CommandKind::Barrier => send_barrier_and_wait_ack(&mut session, timeout, |line| {
            emit_line(stdout, line, opts.include_progress)
        }),
    }
}

fn connect_and_wait_ready<F>(
    port: u16,
    timeout: Duration,
    retry_base: Duration,
    mut on_line: F,
) -> Result<Session, String>
where
    F: FnMut(&ParsedLine),
{
    let deadline = Instant::now() + timeout;
    let mut attempt = 0u32;

    while Instant::now() < deadline {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(writer) => {
                writer
                    .set_read_timeout(Some(Duration::from_millis(100)))
                    .map_err(|error| format!("failed to set socket read timeout: {error}"))?;
                let reader_stream = writer
                    .try_clone()
                    .map_err(|error| format!("failed to clone socket stream: {error}"))?;
                let mut session = Session {
                    writer,
                    reader: BufReader::new(reader_stream),
                };

                match wait_for_ready(&mut session.reader, deadline, &mut on_line) {
                    WaitReadyOutcome::Ready => return Ok(session),
                    WaitReadyOutcome::Timeout => break,
                    WaitReadyOutcome::Disconnected => {
                        if Instant::now() >= deadline {
                            break;
                        }
                    }
                    WaitReadyOutcome::IoError(error) => {
                        return Err(format!(
                            "socket read error while waiting for ready: {error}"
                        ));
                    }
                }
            }
            Err(_) => {
                if Instant::now() >= deadline {
                    break;
                }
            }
        }

        let shift = attempt.min(8);
        let backoff_ms = (retry_base.as_millis() as u64)
            .saturating_mul(1u64 << shift)
            .min(MAX_RETRY_BACKOFF_MS);
        let sleep_for = Duration::from_millis(backoff_ms.max(1));
        let now = Instant::now();
        if now + sleep_for >= deadline {
            break;
        }
        thread::sleep(sleep_for);
        attempt = attempt.saturating_add(1);
    }

    Err(format!(
        "timed out waiting for edport ready on 127.0.0.1:{port}"
    ))
}

enum WaitReadyOutcome {
    Ready,
    Timeout,
    Disconnected,
    IoError(io::Error),
}

fn wait_for_ready<F>(
    reader: &mut BufReader<TcpStream>,
    deadline: Instant,
    on_line: &mut F,
) -> WaitReadyOutcome
where
    F: FnMut(&ParsedLine),
{
    loop {
        match read_one_line(reader, deadline) {
            ReadOutcome::Line(raw) => {
                let parsed = parse_wire_line(&raw);
                on_line(&parsed);
                if parsed.channel == LineChannel::Result && is_ready_payload(&parsed.payload) {
                    return WaitReadyOutcome::Ready;
                }
            }
            ReadOutcome::NoData => {}
            ReadOutcome::Disconnected => return WaitReadyOutcome::Disconnected,
            ReadOutcome::DeadlineExceeded => return WaitReadyOutcome::Timeout,
            ReadOutcome::IoError(error) => return WaitReadyOutcome::IoError(error),
        }
    }
}

fn send_barrier_and_wait_ack<F>(
    session: &mut Session,
    timeout: Duration,
    mut on_line: F,
) -> Result<(), String>
where
    F: FnMut(&ParsedLine),
{
    send_line(&mut session.writer, "sync")?;
    let deadline = Instant::now() + timeout;
    loop {
        match read_one_line(&mut session.reader, deadline) {
            ReadOutcome::Line(raw) => {
                let parsed = parse_wire_line(&raw);
                on_line(&parsed);
                if parsed.channel == LineChannel::Result && is_sync_ok_payload(&parsed.payload) {
                    return Ok(());
                }
            }
            ReadOutcome::NoData => {}
            ReadOutcome::Disconnected => {
                return Err("socket disconnected while waiting for barrier ack".to_string())
            }
            ReadOutcome::DeadlineExceeded => {
                return Err("timed out waiting for barrier ack (ok: sync)".to_string())
            }
            ReadOutcome::IoError(error) => {
                return Err(format!(
                    "socket read error while waiting for barrier ack: {error}"
                ))
            }
        }
    }
}

fn read_until_quiet<F>(
    reader: &mut BufReader<TcpStream>,
    timeout: Duration,
    quiet_window: Duration,
    mut on_line: F,
) -> Result<(), String>
where
    F: FnMut(&ParsedLine),
{
    let deadline = Instant::now() + timeout;
    let mut last_line_at = Instant::now();
    let mut saw_any_line = false;

    loop {
        match read_one_line(reader, deadline) {
            ReadOutcome::Line(raw) => {
                let parsed = parse_wire_line(&raw);
                on_line(&parsed);
                saw_any_line = true;
                last_line_at = Instant::now();
            }
            ReadOutcome::NoData => {
                let now = Instant::now();
                if (saw_any_line && now.saturating_duration_since(last_line_at) >= quiet_window)
                    || (!saw_any_line && now + quiet_window >= deadline)
                {
                    return Ok(());
                }
            }
            ReadOutcome::Disconnected => {
                return Err("socket disconnected while waiting for command output".to_string())
            }
            ReadOutcome::DeadlineExceeded => return Ok(()),
            ReadOutcome::IoError(error) => {
                return Err(format!(
                    "socket read error while waiting for command output: {error}"
                ))
            }
        }
    }
}

fn emit_line<W: Write>(stdout: &mut W, line: &ParsedLine, include_progress: bool) {
    if should_print_line(line, include_progress) {
        let _ = writeln!(stdout, "{}", line.payload);
    }
}

fn send_line(writer: &mut TcpStream, line: &str) -> Result<(), String> {
    writer
        .write_all(line.as_bytes())
        .map_err(|error| format!("failed to send command: {error}"))?;
    writer
        .write_all(b"\n")
        .map_err(|error| format!("failed to terminate command line: {error}"))?;
    writer
        .flush()
        .map_err(|error| format!("failed to flush command line: {error}"))
}

enum ReadOutcome {
    Line(String),
    NoData,
    Disconnected,
    DeadlineExceeded,
    IoError(io::Error),
}

fn read_one_line(reader: &mut BufReader<TcpStream>, deadline: Instant) -> ReadOutcome {
    if Instant::now() >= deadline {
        return ReadOutcome::DeadlineExceeded;
    }

    let mut line = String::new();
    match reader.read_line(&mut line) {
        Ok(0) => ReadOutcome::Disconnected,
        Ok(_) => ReadOutcome::Line(line),
        Err(error)
            if error.kind() == io::ErrorKind::WouldBlock
                || error.kind() == io::ErrorKind::TimedOut =>
        {
            ReadOutcome::NoData
        }
        Err(error) => ReadOutcome::IoError(error),
    }
}
