use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

pub(crate) const EDPORT_DEFAULT_PORT: u16 = 46101;

const RESULT_PREFIX: &str = "R ";
const PROGRESS_PREFIX: &str = "P ";
const SYNC_OK_LINE: &str = "ok: sync";
const WRITE_RETRY_LIMIT: u32 = 100;
const WRITE_RETRY_SLEEP: Duration = Duration::from_millis(1);

/// One decoded client submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RemoteRequest {
    /// Schedule `command` at the given delay from now.
    After { delay: Duration, command: String },
    /// Barrier: acknowledge once the timeline has drained.
    Sync,
}

/// Decodes a raw client line: `sync`, or `after <ms> <command>`.
pub(crate) fn parse_remote_line(line: &str) -> Result<RemoteRequest, String> {
    let trimmed = line.trim();
    if trimmed == "sync" {
        return Ok(RemoteRequest::Sync);
    }
    if let Some(rest) = trimmed.strip_prefix("after ") {
        let Some((millis_text, command)) = rest.split_once(' ') else {
            return Err(format!("missing command after delay in '{trimmed}'"));
        };
        let millis = millis_text
            .parse::<u64>()
            .map_err(|_| format!("invalid delay '{millis_text}' (expected milliseconds)"))?;
        let command = command.trim();
        if command.is_empty() {
            return Err(format!("missing command after delay in '{trimmed}'"));
        }
        return Ok(RemoteRequest::After {
            delay: Duration::from_millis(millis),
            command: command.to_string(),
        });
    }
    Err(format!("unknown request '{trimmed}' (expected 'after <ms> <command>' or 'sync')"))
}

pub(crate) fn ready_line_text(port: u16) -> String {
    format!("edport.ready v1 port:{port}")
}

#[derive(Debug)]
struct Client {
    stream: TcpStream,
    read_buf: Vec<u8>,
    pending_syncs: u32,
}

#[derive(Debug)]
struct Transport {
    listener: TcpListener,
    bound_port: u16,
    clients: Vec<Client>,
}

#[derive(Debug)]
enum Mode {
    Disabled,
    Enabled(Transport),
}

/// Localhost command port: remote clients submit delayed commands and
/// barriers, and receive result (`R `) and progress (`P `) lines back.
#[derive(Debug)]
pub(crate) struct Edport {
    mode: Mode,
}

impl Edport {
    pub(crate) fn initialize(enabled: bool, port: u16) -> Self {
        if !enabled {
            return Self {
                mode: Mode::Disabled,
            };
        }
        match Transport::bind_localhost(port) {
            Ok(transport) => {
                info!(
                    line = %ready_line_text(transport.bound_port),
                    "edport_ready_bound"
                );
                Self {
                    mode: Mode::Enabled(transport),
                }
            }
            Err(error) => {
                warn!(error = %error, port, "edport_bind_failed_disabled");
                Self {
                    mode: Mode::Disabled,
                }
            }
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        matches!(self.mode, Mode::Enabled(_))
    }

    /// Accepts pending clients and decodes their submitted requests. Invalid
    /// lines are answered with an error result line and dropped.
    pub(crate) fn poll_requests(&mut self, out: &mut Vec<RemoteRequest>) {
        let Mode::Enabled(transport) = &mut self.mode else {
            return;
        };
        transport.accept_pending_clients();

        let mut lines = Vec::new();
        transport.poll_client_lines(&mut lines);
        for line in lines {
            match parse_remote_line(&line) {
                Ok(RemoteRequest::Sync) => {
                    transport.note_sync_requested();
                    out.push(RemoteRequest::Sync);
                }
                Ok(request) => out.push(request),
                Err(reason) => {
                    warn!(line = %line, reason = %reason, "edport_bad_request");
                    transport.send_tagged_line(RESULT_PREFIX, &format!("error: {reason}"));
                }
            }
        }
    }

    pub(crate) fn send_result_line(&mut self, line: &str) {
        if let Mode::Enabled(transport) = &mut self.mode {
            transport.send_tagged_line(RESULT_PREFIX, line);
        }
    }

    pub(crate) fn send_progress_line(&mut self, line: &str) {
        if let Mode::Enabled(transport) = &mut self.mode {
            transport.send_tagged_line(PROGRESS_PREFIX, line);
        }
    }

    /// Answers queued barriers once the caller reports the timeline drained.
    pub(crate) fn acknowledge_syncs_when_idle(&mut self, idle: bool) {
        if !idle {
            return;
        }
        let Mode::Enabled(transport) = &mut self.mode else {
            return;
        };
        transport.acknowledge_syncs();
    }
}

impl Transport {
    fn bind_localhost(port: u16) -> io::Result<Self> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let bound_port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            bound_port,
            clients: Vec::new(),
        })
    }

    fn accept_pending_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    if let Err(error) = stream.set_nonblocking(true) {
                        warn!(error = %error, "edport_client_nonblocking_failed");
                        continue;
                    }
                    if let Err(error) = stream.set_nodelay(true) {
                        warn!(error = %error, "edport_client_nodelay_failed");
                    }
                    let mut client = Client {
                        stream,
                        read_buf: Vec::new(),
                        pending_syncs: 0,
                    };
                    let ready = format!("{RESULT_PREFIX}{}\n", ready_line_text(self.bound_port));
                    if write_line(&mut client.stream, ready.as_bytes()).is_ok() {
                        self.clients.push(client);
                    }
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) => {
                    warn!(error = %error, "edport_accept_failed");
                    break;
                }
            }
        }
    }

    fn poll_client_lines(&mut self, out: &mut Vec<String>) {
        let mut index = 0usize;
        while index < self.clients.len() {
            let mut disconnected = false;
            {
                let client = &mut self.clients[index];
                let mut chunk = [0u8; 1024];
                loop {
                    match client.stream.read(&mut chunk) {
                        Ok(0) => {
                            disconnected = true;
                            break;
                        }
                        Ok(bytes_read) => {
                            client.read_buf.extend_from_slice(&chunk[..bytes_read]);
                            drain_complete_lines(&mut client.read_buf, out);
                        }
                        Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                        Err(error) => {
                            warn!(error = %error, "edport_client_read_failed");
                            disconnected = true;
                            break;
                        }
                    }
                }
            }

            if disconnected {
                self.clients.swap_remove(index);
            } else {
                index += 1;
            }
        }
    }

    fn note_sync_requested(&mut self) {
        for client in &mut self.clients {
            client.pending_syncs = client.pending_syncs.saturating_add(1);
        }
    }

    fn acknowledge_syncs(&mut self) {
        let mut any = false;
        for client in &mut self.clients {
            while client.pending_syncs > 0 {
                client.pending_syncs -= 1;
                any = true;
            }
        }
        if any {
            self.send_tagged_line(RESULT_PREFIX, SYNC_OK_LINE);
        }
    }

    fn send_tagged_line(&mut self, prefix: &str, line: &str) {
        let payload = format!("{prefix}{line}\n");
        let mut index = 0usize;
        while index < self.clients.len() {
            let result = write_line(&mut self.clients[index].stream, payload.as_bytes());
            if let Err(error) = result {
                warn!(error = %error, "edport_client_write_failed");
                self.clients.swap_remove(index);
            } else {
                index += 1;
            }
        }
    }
}

fn drain_complete_lines(buffer: &mut Vec<u8>, out: &mut Vec<String>) {
    while let Some(newline_index) = buffer.iter().position(|byte| *byte == b'\n') {
        let mut line_bytes = buffer.drain(..=newline_index).collect::<Vec<u8>>();
        line_bytes.pop(); // newline
        if line_bytes.last().copied() == Some(b'\r') {
            line_bytes.pop();
        }
        match String::from_utf8(line_bytes) {
            Ok(line) => out.push(line),
            Err(error) => warn!(error = %error, "edport_invalid_utf8_line_dropped"),
        }
    }
}

/// Writes a full line to a non-blocking stream, retrying briefly through
/// `WouldBlock`. This port carries a handful of short lines per step, so a
/// bounded retry is enough.
fn write_line(stream: &mut TcpStream, payload: &[u8]) -> io::Result<()> {
    let mut written = 0usize;
    let mut retries = 0u32;
    while written < payload.len() {
        match stream.write(&payload[written..]) {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "edport_write_zero"));
            }
            Ok(bytes_written) => written += bytes_written,
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                retries += 1;
                if retries > WRITE_RETRY_LIMIT {
                    return Err(error);
                }
                thread::sleep(WRITE_RETRY_SLEEP);
            }
            Err(error) => return Err(error),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read as _;
    use std::net::TcpStream;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn remote_lines_parse_delays_and_barriers() {
        assert_eq!(parse_remote_line("sync"), Ok(RemoteRequest::Sync));
        assert_eq!(
            parse_remote_line("after 250 ctrl.begin(0)"),
            Ok(RemoteRequest::After {
                delay: Duration::from_millis(250),
                command: "ctrl.begin(0)".to_string(),
            })
        );
        assert!(parse_remote_line("after abc ctrl.begin(0)").is_err());
        assert!(parse_remote_line("after 250").is_err());
        assert!(parse_remote_line("nonsense").is_err());
    }

    #[test]
    fn disabled_port_ignores_everything() {
        let mut port = Edport::initialize(false, EDPORT_DEFAULT_PORT);
        assert!(!port.is_enabled());

        let mut requests = Vec::new();
        port.poll_requests(&mut requests);
        port.send_result_line("ok: nothing");
        port.acknowledge_syncs_when_idle(true);
        assert!(requests.is_empty());
    }

    #[test]
    fn accepts_client_and_receives_requests() {
        let mut port = Edport::initialize(true, 0);
        let Mode::Enabled(transport) = &port.mode else {
            panic!("port should be enabled");
        };
        let addr = transport.listener.local_addr().expect("local_addr");

        let mut client = TcpStream::connect(addr).expect("connect");
        client
            .write_all(b"after 10 ctrl.begin(0)\nsync\n")
            .expect("write");
        client.flush().expect("flush");

        let mut requests = Vec::new();
        for _ in 0..40 {
            port.poll_requests(&mut requests);
            if requests.len() == 2 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(
            requests,
            vec![
                RemoteRequest::After {
                    delay: Duration::from_millis(10),
                    command: "ctrl.begin(0)".to_string(),
                },
                RemoteRequest::Sync,
            ]
        );
    }

    #[test]
    fn ready_then_results_then_sync_ack_reach_the_client() {
        let mut port = Edport::initialize(true, 0);
        let Mode::Enabled(transport) = &port.mode else {
            panic!("port should be enabled");
        };
        let addr = transport.listener.local_addr().expect("local_addr");
        let bound_port = transport.bound_port;

        let mut client = TcpStream::connect(addr).expect("connect");
        client.set_nonblocking(true).expect("nonblocking");

        let mut requests = Vec::new();
        for _ in 0..40 {
            port.poll_requests(&mut requests);
            if port_client_count(&port) == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(port_client_count(&port), 1);

        client.write_all(b"sync\n").expect("write sync");
        for _ in 0..40 {
            port.poll_requests(&mut requests);
            if requests.iter().any(|req| *req == RemoteRequest::Sync) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        port.send_result_line("ok: ctrl.begin(0)");
        port.send_progress_line("ctrl.set_output(\"process: step 1 @ 0.1s...\")");
        port.acknowledge_syncs_when_idle(true);

        let expected_ready = format!("R {}\n", ready_line_text(bound_port));
        let mut received = Vec::new();
        for _ in 0..80 {
            let mut chunk = [0u8; 256];
            match client.read(&mut chunk) {
                Ok(bytes_read) if bytes_read > 0 => {
                    received.extend_from_slice(&chunk[..bytes_read]);
                    let text = String::from_utf8_lossy(&received);
                    if text.contains("R ok: sync\n") {
                        break;
                    }
                }
                Ok(_) => {}
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {}
                Err(error) => panic!("unexpected read error: {error}"),
            }
            thread::sleep(Duration::from_millis(5));
        }

        let text = String::from_utf8_lossy(&received);
        assert!(text.contains(&expected_ready));
        assert!(text.contains("R ok: ctrl.begin(0)\n"));
        assert!(text.contains("P ctrl.set_output(\"process: step 1 @ 0.1s...\")\n"));
        assert!(text.contains("R ok: sync\n"));
    }

    #[test]
    fn sync_is_not_acknowledged_while_busy() {
        let mut port = Edport::initialize(true, 0);
        let Mode::Enabled(transport) = &port.mode else {
            panic!("port should be enabled");
        };
        let addr = transport.listener.local_addr().expect("local_addr");

        let mut client = TcpStream::connect(addr).expect("connect");
        client.set_nonblocking(true).expect("nonblocking");
        client.write_all(b"sync\n").expect("write");

        let mut requests = Vec::new();
        for _ in 0..40 {
            port.poll_requests(&mut requests);
            if requests.iter().any(|req| *req == RemoteRequest::Sync) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        port.acknowledge_syncs_when_idle(false);

        let mut received = Vec::new();
        for _ in 0..10 {
            let mut chunk = [0u8; 128];
            match client.read(&mut chunk) {
                Ok(bytes_read) if bytes_read > 0 => {
                    received.extend_from_slice(&chunk[..bytes_read]);
                }
                Ok(_) => {}
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {}
                Err(error) => panic!("unexpected read error: {error}"),
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!String::from_utf8_lossy(&received).contains("ok: sync"));
    }

    fn port_client_count(port: &Edport) -> usize {
        match &port.mode {
            Mode::Enabled(transport) => transport.clients.len(),
            Mode::Disabled => 0,
        }
    }
}
