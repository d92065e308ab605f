//! Shared test utilities: scripted mock devices and session builders.

#![allow(dead_code)]

use provlink::device::{DeviceSession, Timeouts};
use provlink::port::MockPort;
use std::time::Duration;

/// Short deadlines so timeout paths resolve quickly in tests.
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        command: Duration::from_millis(200),
        response: Duration::from_millis(200),
        pem_read: Duration::from_millis(200),
        pem_verify: Duration::from_millis(400),
        error_probe: Duration::from_millis(50),
    }
}

/// Script the connect sequence: the sync prompt plus a `conf get` exchange
/// reporting the given key/value pairs as the running configuration.
pub fn scripted_device(conf: &[(&str, &str)]) -> MockPort {
    let port = MockPort::new("MOCK0");
    port.reply_on(b"\x03", b"> ");

    let mut response = b"conf get\r\n".to_vec();
    for (key, value) in conf {
        response.extend(format!("\"{key}\"=\"{value}\"\r\n").into_bytes());
    }
    response.extend_from_slice(b"> ");
    port.reply_on(b"conf get\r\n", &response);

    port
}

/// Open a session over a clone of the scripted port, keeping the original
/// handle free for further scripting and inspection.
pub fn open_session(port: &MockPort) -> DeviceSession {
    DeviceSession::open(Box::new(port.clone()), fast_timeouts())
        .expect("scripted session should open")
}

/// The exact bytes the session places on the wire for a PEM block: line
/// endings normalized to LF, re-emitted with CRLF, then the blank double
/// terminator.
pub fn wire_form(pem: &[u8]) -> Vec<u8> {
    let normalized = normalize(pem);
    let mut wire = Vec::new();
    for line in normalized.split(|&b| b == b'\n') {
        wire.extend_from_slice(line);
        wire.extend_from_slice(b"\r\n");
    }
    wire.extend_from_slice(b"\r\n\r\n");
    wire
}

/// CRLF to LF, as the session normalizes PEM content.
pub fn normalize(pem: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pem.len());
    let mut rest = pem;
    while let Some(pos) = rest.windows(2).position(|w| w == b"\r\n") {
        out.extend_from_slice(&rest[..pos]);
        out.push(b'\n');
        rest = &rest[pos + 2..];
    }
    out.extend_from_slice(rest);
    out
}
