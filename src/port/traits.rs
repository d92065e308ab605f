//! Core trait for the byte channel abstraction.

use super::error::PortError;

/// A duplex byte stream with bounded reads.
///
/// Implementations must honor a short read-timeout slice: `read_bytes`
/// returns within roughly the slice duration whether or not data arrived,
/// reporting a timeout-kind I/O error (or `Ok(0)`) when the link was quiet.
/// The line reader layered on top uses that property to poll without ever
/// blocking past a caller-supplied deadline.
pub trait ByteChannel: Send + std::fmt::Debug {
    /// Write bytes to the channel, returning the number actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes into the buffer, returning the number actually read.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Push any locally buffered output onto the wire.
    fn flush(&mut self) -> Result<(), PortError>;

    /// Discard unread input and unsent output.
    ///
    /// Called once at session start so that stale bytes from a previous
    /// session cannot desynchronize the readback verification.
    fn clear_buffers(&mut self) -> Result<(), PortError>;

    /// The name/path of this channel, for logging.
    fn name(&self) -> &str;

    /// Bytes currently available to read, if the channel can tell.
    fn bytes_to_read(&self) -> Option<usize> {
        None
    }
}
