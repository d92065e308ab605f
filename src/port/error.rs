//! Port-specific error types.
//!
//! Kept separate from the transport-level error taxonomy: these describe
//! failures of the byte channel itself, not of the line protocol running
//! over it.

use thiserror::Error;

/// Errors that can occur during byte channel operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial port was not found on the system.
    #[error("serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port configuration was rejected.
    #[error("configuration error: {0}")]
    Config(String),

    /// A serialport-specific error occurred.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True when the error is a benign "no data arrived within the read
    /// slice" condition rather than a real fault.
    pub fn is_read_timeout(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = PortError::not_found("/dev/ttyUSB0");
        assert_eq!(err.to_string(), "serial port not found: /dev/ttyUSB0");

        let err = PortError::config("invalid baud rate");
        assert_eq!(err.to_string(), "configuration error: invalid baud rate");
    }

    #[test]
    fn read_timeout_classification() {
        let timed_out = PortError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "slice expired",
        ));
        assert!(timed_out.is_read_timeout());

        let broken = PortError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "gone",
        ));
        assert!(!broken.is_read_timeout());
    }
}
