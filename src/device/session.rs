//! Device transport session.
//!
//! Implements the half-duplex command/response protocol spoken by the
//! provisioning console of the target firmware: every command line sent is
//! verified against the target's local echo, responses are collected until
//! the `"> "` prompt, PEM blocks are transferred with mandatory readback
//! verification, and configuration edits are staged locally and committed in
//! one batch.
//!
//! The session is strictly sequential: one exclusively owned channel, one
//! outstanding exchange at a time, every call bounded by a deadline. Any
//! classified failure faults the session; a faulted session refuses further
//! device traffic and must be reconnected.

use super::error::DeviceError;
use super::line::LineChannel;
use crate::port::{ByteChannel, SyncSerialPort};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// The target emits this (with no line terminator) when ready for the next
/// command.
const PROMPT: &[u8] = b"> ";

/// Substrings that mark a response line as a fault report from the target.
const ERROR_MARKERS: [&[u8]; 4] = [b"error", b"Error", b"ERROR", b"<ERR>"];

const PEM_BEGIN: &[u8] = b"-----BEGIN ";
const PEM_END: &[u8] = b"-----END ";

/// Control-C, sent at session start to make the target abandon any
/// half-typed line and reprint its prompt.
const SYNC_BYTE: &[u8] = &[0x03];

/// Per-operation deadlines.
///
/// The defaults mirror the provisioning console's observed response rates:
/// 2 s for ordinary exchanges and 5 s for the echo of a freshly written PEM
/// block, which the target re-emits only after persisting it. None of these
/// derive from a documented protocol rate, so all are adjustable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Waiting for the command echo.
    pub command: Duration,
    /// Waiting for a response to terminate with the prompt.
    pub response: Duration,
    /// Waiting for a requested PEM block.
    pub pem_read: Duration,
    /// Waiting for the echo of a written PEM block.
    pub pem_verify: Duration,
    /// Short window after a bulk-input command in which an immediate
    /// rejection is caught before any bulk data is sent.
    pub error_probe: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command: Duration::from_secs(2),
            response: Duration::from_secs(2),
            pem_read: Duration::from_secs(2),
            pem_verify: Duration::from_secs(5),
            error_probe: Duration::from_millis(250),
        }
    }
}

/// States of the PEM scanner in [`DeviceSession::read_pem`].
enum PemScan {
    /// Draining banner/echo noise ahead of the block.
    Idle,
    /// Between the begin and end markers; every line is buffered.
    InBlock,
    /// End marker seen.
    Done,
}

/// A connected provisioning session with one target device.
///
/// Construction performs the full connect sequence: buffers cleared, sync
/// control byte sent and its response drained, running configuration
/// queried. From then on the session holds the device's running key/value
/// configuration plus locally staged edits that [`conf_commit`] writes back
/// in one batch.
///
/// [`conf_commit`]: DeviceSession::conf_commit
#[derive(Debug)]
pub struct DeviceSession {
    channel: LineChannel,
    timeouts: Timeouts,
    /// Last known device-resident configuration.
    running_config: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Locally queued edits not yet written to the device. Holds only keys
    /// whose value differs from `running_config`, or new keys.
    staged_config: BTreeMap<Vec<u8>, Vec<u8>>,
    faulted: bool,
}

impl DeviceSession {
    /// Connect to a target on a real serial port with default timeouts.
    pub fn connect(path: &str, baud: u32) -> Result<Self, DeviceError> {
        let port = SyncSerialPort::open(path, baud)?;
        Self::open(Box::new(port), Timeouts::default())
    }

    /// Open a session over an already constructed byte channel.
    pub fn open(mut port: Box<dyn ByteChannel>, timeouts: Timeouts) -> Result<Self, DeviceError> {
        port.clear_buffers()?;

        let mut session = Self {
            channel: LineChannel::new(port),
            timeouts,
            running_config: BTreeMap::new(),
            staged_config: BTreeMap::new(),
            faulted: false,
        };

        session.sync()?;
        session.load_running_config()?;
        debug!(port = session.channel.name(), "session ready");
        Ok(session)
    }

    /// The name of the underlying channel.
    pub fn port_name(&self) -> &str {
        self.channel.name()
    }

    /// Whether a previous operation faulted this session.
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// The deadlines this session operates under.
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    // ---- command/response exchange ------------------------------------

    /// Send one command line and verify the target's echo.
    ///
    /// Tokens are joined with single spaces and terminated with CRLF. The
    /// first non-empty line read back must contain the command bytes;
    /// anything else (including silence until the deadline) is a
    /// [`DeviceError::ReadbackMismatch`]. Only the echoed line is consumed;
    /// the response remains for [`read_response`](Self::read_response).
    pub fn send_command(&mut self, tokens: &[&[u8]]) -> Result<(), DeviceError> {
        self.protocol(|session| session.send_command_inner(tokens))
    }

    /// Collect response lines until the prompt or the deadline.
    ///
    /// Lines carrying an error marker set the failure flag but collection
    /// keeps draining until the prompt or deadline, so the stream stays
    /// aligned for the next exchange.
    pub fn read_response(&mut self) -> Result<Vec<Vec<u8>>, DeviceError> {
        self.protocol(|session| session.read_response_inner(session.timeouts.response))
    }

    /// Read one PEM block from the response stream.
    pub fn read_pem(&mut self) -> Result<Vec<u8>, DeviceError> {
        self.protocol(|session| session.read_pem_inner(session.timeouts.pem_read))
    }

    /// Write a PEM block and verify the target's echo byte-for-byte.
    ///
    /// Both sides are compared after CRLF normalization and are otherwise
    /// exact: the readback always carries the footer's newline, so an input
    /// lacking its trailing newline fails verification.
    pub fn write_pem(&mut self, pem: &[u8]) -> Result<(), DeviceError> {
        self.protocol(|session| session.write_pem_inner(pem))
    }

    // ---- PKI and control operations -----------------------------------

    /// Ask the target to reboot. The target echoes the command and resets
    /// without a response, so nothing further is read.
    pub fn reset(&mut self) -> Result<(), DeviceError> {
        self.protocol(|session| session.send_command_inner(&[b"reset"]))
    }

    /// Generate a keypair on the target and return the public half as PEM.
    pub fn generate_key(&mut self, label: Option<&str>) -> Result<Vec<u8>, DeviceError> {
        self.protocol(|session| {
            match label {
                Some(label) => session.send_command_inner(&[
                    b"pki",
                    b"generate",
                    b"key",
                    label.as_bytes(),
                ])?,
                None => session.send_command_inner(&[b"pki", b"generate", b"key"])?,
            }
            session.read_pem_inner(session.timeouts.pem_read)
        })
    }

    /// Request a certificate signing request generated on the target.
    pub fn generate_csr(&mut self) -> Result<Vec<u8>, DeviceError> {
        self.protocol(|session| {
            session.send_command_inner(&[b"pki", b"generate", b"csr"])?;
            session.read_pem_inner(session.timeouts.pem_read)
        })
    }

    /// Request a self-signed certificate generated on the target.
    pub fn generate_cert(&mut self) -> Result<Vec<u8>, DeviceError> {
        self.protocol(|session| {
            session.send_command_inner(&[b"pki", b"generate", b"cert"])?;
            session.read_pem_inner(session.timeouts.pem_read)
        })
    }

    /// Import a certificate in PEM form under an optional label.
    ///
    /// A rejection the target reports right after the import command (for
    /// example an invalid label) surfaces as [`DeviceError::TargetError`]
    /// before any PEM bytes are sent.
    pub fn write_cert(&mut self, cert: &[u8], label: Option<&str>) -> Result<(), DeviceError> {
        self.protocol(|session| {
            match label {
                Some(label) => session.send_command_inner(&[
                    b"pki",
                    b"import",
                    b"cert",
                    label.as_bytes(),
                ])?,
                None => session.send_command_inner(&[b"pki", b"import", b"cert"])?,
            }
            session.probe_for_error(session.timeouts.error_probe)?;
            session.write_pem_inner(cert)
        })
    }

    // ---- configuration cache ------------------------------------------

    /// Look up a key, staged value shadowing the running value.
    pub fn conf_get(&self, key: &str) -> Option<String> {
        let key = key.as_bytes();
        self.staged_config
            .get(key)
            .or_else(|| self.running_config.get(key))
            .map(|value| String::from_utf8_lossy(value).into_owned())
    }

    /// Stage a local edit.
    ///
    /// Values equal to the running value are not staged; staging the running
    /// value over an earlier edit drops that edit, so the staged map only
    /// ever holds real differences.
    pub fn conf_set(&mut self, key: &str, value: &str) {
        let key = key.as_bytes().to_vec();
        let value = value.as_bytes().to_vec();
        if self.running_config.get(&key) == Some(&value) {
            self.staged_config.remove(&key);
        } else {
            self.staged_config.insert(key, value);
        }
    }

    /// The merged view: configuration as it would be after a commit.
    pub fn conf_get_all(&self) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();
        for (key, value) in &self.running_config {
            merged.insert(lossy(key), lossy(value));
        }
        for (key, value) in &self.staged_config {
            merged.insert(lossy(key), lossy(value));
        }
        merged
    }

    /// Write all staged edits to the device and commit them.
    ///
    /// One `conf set` per staged key that differs from (or is absent from)
    /// the running configuration, then a single `conf commit`, each followed
    /// by a response read. With nothing staged this performs zero device
    /// traffic, though a faulted session still refuses the call. On success
    /// the staged entries become the new running truth.
    pub fn conf_commit(&mut self) -> Result<(), DeviceError> {
        self.protocol(|session| {
            if session.staged_config.is_empty() {
                return Ok(());
            }

            let staged: Vec<(Vec<u8>, Vec<u8>)> = session
                .staged_config
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();

            for (key, value) in &staged {
                if session.running_config.get(key) != Some(value) {
                    session.send_command_inner(&[b"conf", b"set", key, value])?;
                    session.read_response_inner(session.timeouts.response)?;
                }
            }

            session.send_command_inner(&[b"conf", b"commit"])?;
            session.read_response_inner(session.timeouts.response)?;

            for (key, value) in staged {
                session.running_config.insert(key, value);
            }
            session.staged_config.clear();
            Ok(())
        })
    }

    // ---- internals ----------------------------------------------------

    /// Run one protocol operation under the fault gate: a faulted session
    /// refuses the call, and any failure faults the session.
    fn protocol<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, DeviceError>,
    ) -> Result<T, DeviceError> {
        if self.faulted {
            return Err(DeviceError::Faulted);
        }
        let result = op(self);
        if result.is_err() {
            self.faulted = true;
        }
        result
    }

    /// Send Control-C to clear any half-typed line, then drain the prompt.
    fn sync(&mut self) -> Result<(), DeviceError> {
        debug!("TX: 0x03 (sync)");
        self.channel.write_all(SYNC_BYTE)?;
        self.channel.flush()?;
        self.read_response_inner(self.timeouts.response)?;
        Ok(())
    }

    /// Query `conf get` and parse the `"key"="value"` lines into the
    /// running configuration.
    fn load_running_config(&mut self) -> Result<(), DeviceError> {
        self.send_command_inner(&[b"conf", b"get"])?;
        let lines = self.read_response_inner(self.timeouts.response)?;
        self.running_config = parse_config_lines(&lines);
        Ok(())
    }

    fn send_command_inner(&mut self, tokens: &[&[u8]]) -> Result<(), DeviceError> {
        let command = tokens.join(&b' ');
        let mut wire = command.clone();
        wire.extend_from_slice(b"\r\n");

        debug!("TX: {:?} (send_command)", String::from_utf8_lossy(&wire));
        self.channel.write_all(&wire)?;
        self.channel.flush()?;

        let deadline = Instant::now() + self.timeouts.command;
        let readback = self.channel.read_line(deadline)?;
        debug!("RX: {:?} (send_command)", String::from_utf8_lossy(&readback));

        if contains(&readback, &command) {
            Ok(())
        } else {
            Err(DeviceError::ReadbackMismatch)
        }
    }

    fn read_response_inner(&mut self, timeout: Duration) -> Result<Vec<Vec<u8>>, DeviceError> {
        let mut response: Vec<Vec<u8>> = Vec::new();
        let mut error_seen = false;
        let mut prompt_seen = false;
        let deadline = Instant::now() + timeout;

        loop {
            let line = self.channel.read_line(deadline)?;
            if line.is_empty() {
                break;
            }
            debug!("RX: {:?} (read_response)", String::from_utf8_lossy(&line));

            if line == PROMPT {
                prompt_seen = true;
                break;
            }
            if has_error_marker(&line) {
                // Keep draining: the target may still emit trailing output,
                // and stopping early would desynchronize the next exchange.
                error_seen = true;
            }
            response.push(line);
        }

        if error_seen {
            Err(DeviceError::TargetError)
        } else if !prompt_seen {
            Err(DeviceError::ResponseTimeout(timeout))
        } else {
            Ok(response)
        }
    }

    fn read_pem_inner(&mut self, timeout: Duration) -> Result<Vec<u8>, DeviceError> {
        let mut pem: Vec<u8> = Vec::new();
        let mut scan = PemScan::Idle;
        let mut error_seen = false;
        let deadline = Instant::now() + timeout;

        loop {
            let line = self.channel.read_line(deadline)?;
            if line.is_empty() {
                break;
            }
            debug!("RX: {:?} (read_pem)", String::from_utf8_lossy(&line));

            let mut line = normalize_line_endings(&line);

            if contains(&line, PROMPT) {
                if line == PROMPT {
                    // The target returned to its prompt before the footer:
                    // it gave up on the block.
                    error_seen = true;
                    break;
                }
                line = strip_all(&line, PROMPT);
            }

            match scan {
                PemScan::Idle => {
                    if contains(&line, PEM_BEGIN) {
                        pem.extend_from_slice(&line);
                        scan = PemScan::InBlock;
                    } else if has_error_marker(&line) {
                        error_seen = true;
                        break;
                    }
                    // Anything else is banner/echo noise ahead of the block.
                }
                PemScan::InBlock => {
                    pem.extend_from_slice(&line);
                    if contains(&line, PEM_END) {
                        scan = PemScan::Done;
                        break;
                    }
                }
                PemScan::Done => unreachable!(),
            }
        }

        if error_seen {
            return Err(DeviceError::TargetError);
        }
        if !matches!(scan, PemScan::Done) {
            return Err(DeviceError::ResponseTimeout(timeout));
        }

        // The target emits trailing banner lines after the footer; drain
        // them through a normal response cycle and discard.
        self.read_response_inner(self.timeouts.response)?;

        Ok(pem)
    }

    fn write_pem_inner(&mut self, pem: &[u8]) -> Result<(), DeviceError> {
        let normalized = normalize_line_endings(pem);

        for line in normalized.split(|&b| b == b'\n') {
            let mut wire = Vec::with_capacity(line.len() + 2);
            wire.extend_from_slice(line);
            wire.extend_from_slice(b"\r\n");
            debug!("TX: {:?} (write_pem)", String::from_utf8_lossy(&wire));
            self.channel.write_all(&wire)?;
        }

        // Blank double terminator signals end-of-input to the target.
        self.channel.write_all(b"\r\n\r\n")?;
        self.channel.flush()?;

        let readback = self.read_pem_inner(self.timeouts.pem_verify)?;

        if normalized != readback {
            return Err(DeviceError::ReadbackError);
        }
        Ok(())
    }

    /// Watch the stream for a short window after a bulk-input command. An
    /// immediate error report (drained through its prompt) aborts before
    /// any bulk data goes out; silence means the target is waiting for
    /// input.
    fn probe_for_error(&mut self, window: Duration) -> Result<(), DeviceError> {
        let deadline = Instant::now() + window;
        let mut error_seen = false;

        loop {
            let line = self.channel.read_line(deadline)?;
            if line.is_empty() {
                break;
            }
            debug!("RX: {:?} (error probe)", String::from_utf8_lossy(&line));

            if line == PROMPT {
                if error_seen {
                    break;
                }
            } else if has_error_marker(&line) {
                error_seen = true;
            }
        }

        if error_seen {
            Err(DeviceError::TargetError)
        } else {
            Ok(())
        }
    }
}

// ---- helpers ----------------------------------------------------------

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    memchr::memmem::find(haystack, needle).is_some()
}

fn has_error_marker(line: &[u8]) -> bool {
    ERROR_MARKERS.iter().any(|marker| contains(line, marker))
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Replace every CRLF pair with a bare LF. Lone CR bytes are preserved.
fn normalize_line_endings(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut rest = bytes;
    while let Some(pos) = memchr::memmem::find(rest, b"\r\n") {
        out.extend_from_slice(&rest[..pos]);
        out.push(b'\n');
        rest = &rest[pos + 2..];
    }
    out.extend_from_slice(rest);
    out
}

/// Remove every occurrence of `token`.
fn strip_all(bytes: &[u8], token: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut rest = bytes;
    while let Some(pos) = memchr::memmem::find(rest, token) {
        out.extend_from_slice(&rest[..pos]);
        rest = &rest[pos + token.len()..];
    }
    out.extend_from_slice(rest);
    out
}

/// Parse `"key"="value"` response lines: line terminators and quotes are
/// stripped, the first `=` splits key from value, lines without `=` are
/// ignored.
fn parse_config_lines(lines: &[Vec<u8>]) -> BTreeMap<Vec<u8>, Vec<u8>> {
    let mut conf = BTreeMap::new();
    for line in lines {
        let line = strip_all(line, b"\r\n");
        let line: Vec<u8> = line.into_iter().filter(|&b| b != b'"').collect();
        if let Some(pos) = memchr::memchr(b'=', &line) {
            conf.insert(line[..pos].to_vec(), line[pos + 1..].to_vec());
        }
    }
    conf
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_replaces_crlf_only() {
        assert_eq!(normalize_line_endings(b"a\r\nb\r\n"), b"a\nb\n");
        assert_eq!(normalize_line_endings(b"a\nb"), b"a\nb");
        assert_eq!(normalize_line_endings(b"a\rb"), b"a\rb");
        assert_eq!(normalize_line_endings(b""), b"");
    }

    #[test]
    fn strip_all_removes_every_occurrence() {
        assert_eq!(strip_all(b"> x> y", b"> "), b"xy");
        assert_eq!(strip_all(b"plain", b"> "), b"plain");
    }

    #[test]
    fn error_markers_match_all_variants() {
        assert!(has_error_marker(b"an error occurred\r\n"));
        assert!(has_error_marker(b"Error: bad\r\n"));
        assert!(has_error_marker(b"ERROR 42\r\n"));
        assert!(has_error_marker(b"<ERR> fault\r\n"));
        assert!(!has_error_marker(b"all good\r\n"));
    }

    #[test]
    fn config_lines_parse_with_quotes_stripped() {
        let lines = vec![
            b"\"thing_name\"=\"device42\"\r\n".to_vec(),
            b"\"endpoint\"=\"\"\r\n".to_vec(),
            b"no equals here\r\n".to_vec(),
        ];
        let conf = parse_config_lines(&lines);
        assert_eq!(conf.get(&b"thing_name"[..]), Some(&b"device42".to_vec()));
        assert_eq!(conf.get(&b"endpoint"[..]), Some(&b"".to_vec()));
        assert_eq!(conf.len(), 2);
    }

    #[test]
    fn config_value_may_contain_equals() {
        let lines = vec![b"\"token\"=\"a=b\"\r\n".to_vec()];
        let conf = parse_config_lines(&lines);
        assert_eq!(conf.get(&b"token"[..]), Some(&b"a=b".to_vec()));
    }

    #[test]
    fn default_timeouts() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.command, Duration::from_secs(2));
        assert_eq!(timeouts.response, Duration::from_secs(2));
        assert_eq!(timeouts.pem_read, Duration::from_secs(2));
        assert_eq!(timeouts.pem_verify, Duration::from_secs(5));
    }
}
