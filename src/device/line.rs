//! Line framing over a byte channel.
//!
//! Splits the incoming byte stream into lines without ever blocking past a
//! caller-supplied deadline. The target's prompt (`"> "`) carries no line
//! terminator, so a quiet poll slice with buffered bytes yields those bytes
//! as a partial line rather than waiting for a terminator that will never
//! come.

use crate::port::{ByteChannel, PortError};
use std::time::{Duration, Instant};

/// Per-call read chunk size. Lines on this protocol are short; PEM bodies
/// arrive as many 64-character lines.
const CHUNK_SIZE: usize = 256;

/// Back-off between polls when the channel reports no data immediately,
/// so adapters that fail fast (e.g. mocks) do not spin hot.
const QUIET_POLL_PAUSE: Duration = Duration::from_millis(1);

/// A byte channel with line-oriented reads and raw writes.
///
/// Owns the channel exclusively; the session performs every read and write
/// through this single wrapper so the read position is always well defined.
#[derive(Debug)]
pub struct LineChannel {
    port: Box<dyn ByteChannel>,
    buffer: Vec<u8>,
}

impl LineChannel {
    pub fn new(port: Box<dyn ByteChannel>) -> Self {
        Self {
            port,
            buffer: Vec::new(),
        }
    }

    /// The name of the underlying channel, for logging.
    pub fn name(&self) -> &str {
        self.port.name()
    }

    /// Discard unread input and unsent output on the underlying channel.
    /// Any partially buffered line is dropped with it.
    pub fn reset(&mut self) -> Result<(), PortError> {
        self.buffer.clear();
        self.port.clear_buffers()
    }

    /// Read one line, waiting no longer than `deadline`.
    ///
    /// Returns a complete line including its terminator as soon as one is
    /// buffered. If the link goes quiet for a poll slice while partial bytes
    /// are buffered, those bytes are returned as-is. Returns an empty vec
    /// when the deadline passes with nothing buffered; the caller decides
    /// whether that means retry or timeout.
    pub fn read_line(&mut self, deadline: Instant) -> Result<Vec<u8>, PortError> {
        loop {
            if let Some(pos) = memchr::memchr(b'\n', &self.buffer) {
                return Ok(self.buffer.drain(..=pos).collect());
            }

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            let mut chunk = [0u8; CHUNK_SIZE];
            match self.port.read_bytes(&mut chunk) {
                Ok(0) => {}
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);
                    continue;
                }
                Err(ref e) if e.is_read_timeout() => {}
                Err(e) => return Err(e),
            }

            // The read slice expired without new data. A partial line that
            // stopped arriving is handed to the caller now; this is how the
            // unterminated prompt surfaces.
            if !self.buffer.is_empty() {
                return Ok(std::mem::take(&mut self.buffer));
            }

            std::thread::sleep(QUIET_POLL_PAUSE);
        }
    }

    /// Write all bytes to the channel.
    pub fn write_all(&mut self, mut data: &[u8]) -> Result<(), PortError> {
        while !data.is_empty() {
            let written = self.port.write_bytes(data)?;
            if written == 0 {
                return Err(PortError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "channel accepted no bytes",
                )));
            }
            data = &data[written..];
        }
        Ok(())
    }

    /// Flush buffered output onto the wire.
    pub fn flush(&mut self) -> Result<(), PortError> {
        self.port.flush()
    }
}
