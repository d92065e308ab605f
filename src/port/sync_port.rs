//! Synchronous serial port adapter.
//!
//! Wraps the `serialport` crate behind the [`ByteChannel`] trait. The port
//! is opened 8N1 without flow control, matching the wire protocol of the
//! provisioning console, with a short read-timeout slice used by the line
//! reader to poll.

use super::error::PortError;
use super::traits::ByteChannel;
use std::io::{Read, Write};
use std::time::Duration;

/// Read-timeout slice applied to the underlying port. Reads return after at
/// most this long so the line reader can check its deadline between slices.
pub(crate) const READ_SLICE: Duration = Duration::from_millis(100);

/// Synchronous serial port implementation wrapping `serialport::SerialPort`.
pub struct SyncSerialPort {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SyncSerialPort {
    /// Open a serial port at the given baud rate.
    ///
    /// # Example
    /// ```no_run
    /// use provlink::port::SyncSerialPort;
    ///
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", 115_200)?;
    /// # Ok::<(), provlink::port::PortError>(())
    /// ```
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, PortError> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .flow_control(serialport::FlowControl::None)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(READ_SLICE)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice
                | serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                    PortError::not_found(port_name)
                }
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl ByteChannel for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.port.write(data).map_err(PortError::Io)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.port.read(buffer).map_err(PortError::Io)
    }

    fn flush(&mut self) -> Result<(), PortError> {
        self.port.flush().map_err(PortError::Io)
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(PortError::Serial)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_to_read(&self) -> Option<usize> {
        self.port.bytes_to_read().ok().map(|n| n as usize)
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_port_reports_not_found() {
        let result = SyncSerialPort::open("/dev/nonexistent_port_12345", 115_200);

        assert!(result.is_err());
        match result {
            Err(PortError::NotFound(name)) => assert!(name.contains("nonexistent")),
            Err(other) => panic!("expected NotFound error, got: {:?}", other),
            Ok(_) => panic!("open unexpectedly succeeded"),
        }
    }
}
