//! Scripted mock port for testing.
//!
//! Provides a [`MockPort`] that simulates the provisioning console without
//! hardware. Tests enqueue the bytes the device is scripted to transmit and
//! inspect the bytes the transport wrote. The mock is `Clone` over shared
//! state, so a test can hand one handle to the session and keep another for
//! scripting and inspection.

use super::error::PortError;
use super::traits::ByteChannel;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes the simulated device will transmit, drained by reads.
    read_queue: VecDeque<u8>,
    /// Log of every write, one entry per `write_bytes` call.
    write_log: Vec<Vec<u8>>,
    /// Ordered half-duplex script: when a write contains the trigger at the
    /// front of the queue, the paired response is queued for reading.
    replies: VecDeque<(Vec<u8>, Vec<u8>)>,
    /// Whether `clear_buffers` was invoked.
    buffers_cleared: bool,
    /// When set, the next read fails with this I/O error kind.
    fail_next_read: Option<std::io::ErrorKind>,
}

/// Mock byte channel backed by in-memory queues.
///
/// # Example
/// ```
/// use provlink::port::{ByteChannel, MockPort};
///
/// let mut port = MockPort::new("MOCK0");
/// port.enqueue_read(b"hello\r\n");
///
/// let mut buffer = [0u8; 16];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"hello\r\n");
///
/// port.write_bytes(b"reset\r\n").unwrap();
/// assert_eq!(port.write_log(), vec![b"reset\r\n".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockPort {
    /// Create a new mock port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState::default())),
        }
    }

    /// Enqueue bytes the simulated device will transmit.
    pub fn enqueue_read(&self, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.read_queue.extend(data);
    }

    /// Script a half-duplex turn: once a write containing `trigger` occurs,
    /// `response` becomes readable. Replies fire in the order they were
    /// scripted, one per matching write, which models a device that only
    /// speaks after being spoken to.
    pub fn reply_on(&self, trigger: &[u8], response: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.replies.push_back((trigger.to_vec(), response.to_vec()));
    }

    /// Make the next read fail with the given I/O error kind.
    pub fn fail_next_read(&self, kind: std::io::ErrorKind) {
        let mut state = self.state.lock().unwrap();
        state.fail_next_read = Some(kind);
    }

    /// All writes performed so far, one entry per call.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.write_log.clone()
    }

    /// All written bytes concatenated into one buffer.
    pub fn written_bytes(&self) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        state.write_log.concat()
    }

    /// Forget all recorded writes.
    pub fn clear_write_log(&self) {
        let mut state = self.state.lock().unwrap();
        state.write_log.clear();
    }

    /// Whether `clear_buffers` has been called on this port.
    pub fn was_cleared(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.buffers_cleared
    }

    /// Bytes still queued for the transport to read.
    pub fn pending_read_bytes(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.read_queue.len()
    }
}

impl ByteChannel for MockPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock().unwrap();
        state.write_log.push(data.to_vec());

        let triggered = matches!(
            state.replies.front(),
            Some((trigger, _)) if memchr::memmem::find(data, trigger).is_some()
        );
        if triggered {
            let (_, response) = state.replies.pop_front().unwrap();
            state.read_queue.extend(response);
        }

        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock().unwrap();

        if let Some(kind) = state.fail_next_read.take() {
            return Err(PortError::Io(std::io::Error::new(kind, "injected fault")));
        }

        let mut bytes_read = 0;
        for byte in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(queued) => {
                    *byte = queued;
                    bytes_read += 1;
                }
                None => break,
            }
        }

        if bytes_read == 0 {
            // An empty queue reads as a quiet link, matching the timeout
            // behavior of a real port's read slice.
            Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "no data available",
            )))
        } else {
            Ok(bytes_read)
        }
    }

    fn flush(&mut self) -> Result<(), PortError> {
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        // The scripted transmit queue deliberately survives: it models what
        // the device will say next, not what is sitting in the input buffer.
        let mut state = self.state.lock().unwrap();
        state.buffers_cleared = true;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_to_read(&self) -> Option<usize> {
        let state = self.state.lock().unwrap();
        Some(state.read_queue.len())
    }
}

impl std::fmt::Debug for MockPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPort")
            .field("name", &self.name)
            .field("pending_read_bytes", &self.pending_read_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_and_read() {
        let mut port = MockPort::new("MOCK0");
        port.enqueue_read(b"hello");

        let mut buffer = [0u8; 10];
        let n = port.read_bytes(&mut buffer).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buffer[..n], b"hello");
    }

    #[test]
    fn write_logging() {
        let mut port = MockPort::new("MOCK0");
        port.write_bytes(b"one").unwrap();
        port.write_bytes(b"two").unwrap();

        assert_eq!(port.write_log(), vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(port.written_bytes(), b"onetwo");
    }

    #[test]
    fn empty_queue_reads_as_timeout() {
        let mut port = MockPort::new("MOCK0");
        let mut buffer = [0u8; 10];

        let result = port.read_bytes(&mut buffer);
        match result {
            Err(ref e) => assert!(e.is_read_timeout(), "got {:?}", e),
            Ok(n) => panic!("expected timeout, read {} bytes", n),
        }
    }

    #[test]
    fn partial_read_keeps_remainder_queued() {
        let mut port = MockPort::new("MOCK0");
        port.enqueue_read(b"hello, world!");

        let mut buffer = [0u8; 5];
        let n = port.read_bytes(&mut buffer).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buffer[..n], b"hello");
        assert_eq!(port.pending_read_bytes(), 8);
    }

    #[test]
    fn clear_buffers_preserves_script() {
        let mut port = MockPort::new("MOCK0");
        port.enqueue_read(b"> ");

        port.clear_buffers().unwrap();
        assert!(port.was_cleared());
        assert_eq!(port.pending_read_bytes(), 2);
    }

    #[test]
    fn injected_read_fault() {
        let mut port = MockPort::new("MOCK0");
        port.fail_next_read(std::io::ErrorKind::BrokenPipe);

        let mut buffer = [0u8; 4];
        let result = port.read_bytes(&mut buffer);
        match result {
            Err(PortError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
            other => panic!("expected injected I/O fault, got {:?}", other),
        }
    }

    #[test]
    fn scripted_reply_fires_on_matching_write() {
        let mut port = MockPort::new("MOCK0");
        port.reply_on(b"conf get", b"\"key\"=\"value\"\r\n> ");

        // An unrelated write does not consume the reply.
        port.write_bytes(b"\x03").unwrap();
        assert_eq!(port.pending_read_bytes(), 0);

        port.write_bytes(b"conf get\r\n").unwrap();
        let mut buffer = [0u8; 64];
        let n = port.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"\"key\"=\"value\"\r\n> ");
    }

    #[test]
    fn replies_fire_in_script_order() {
        let mut port = MockPort::new("MOCK0");
        port.reply_on(b"first", b"1");
        port.reply_on(b"second", b"2");

        // "second" does not match the front of the script yet.
        port.write_bytes(b"second").unwrap();
        assert_eq!(port.pending_read_bytes(), 0);

        port.write_bytes(b"first").unwrap();
        port.write_bytes(b"second").unwrap();
        assert_eq!(port.pending_read_bytes(), 2);
    }

    #[test]
    fn clone_shares_state() {
        let port = MockPort::new("MOCK0");
        let mut handle = port.clone();

        port.enqueue_read(b"shared");
        let mut buffer = [0u8; 6];
        let n = handle.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"shared");
        assert_eq!(port.pending_read_bytes(), 0);
    }
}
