//! Classified transport errors.
//!
//! Every protocol operation either fully succeeds or fails with exactly one
//! of these variants; nothing is retried internally and nothing is silently
//! swallowed. Retry policy belongs to the provisioning workflow above the
//! transport.

use crate::port::PortError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the device transport session.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The command echo read back from the target did not contain the
    /// command that was sent. Indicates wire corruption or a desynchronized
    /// protocol stream.
    #[error("command readback did not match the command sent")]
    ReadbackMismatch,

    /// No terminating prompt was observed within the deadline. Indicates a
    /// hung or unresponsive target, or a lost terminator.
    #[error("target did not respond within {0:?}")]
    ResponseTimeout(Duration),

    /// The target explicitly reported an error, or a PEM read aborted at a
    /// bare prompt before any block was seen.
    #[error("target reported an error")]
    TargetError,

    /// The PEM content read back differs from the content written.
    /// Indicates data corruption during transfer.
    #[error("PEM readback does not match the data written")]
    ReadbackError,

    /// A previous operation faulted this session; it must be reconnected,
    /// not reused.
    #[error("session is faulted; reconnect before issuing further commands")]
    Faulted,

    /// The underlying byte channel failed.
    #[error(transparent)]
    Port(#[from] PortError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_timeout() {
        let err = DeviceError::ResponseTimeout(Duration::from_secs(2));
        assert!(err.to_string().contains("2s"));
    }

    #[test]
    fn port_errors_convert() {
        let err: DeviceError = PortError::not_found("/dev/ttyACM0").into();
        assert!(matches!(err, DeviceError::Port(PortError::NotFound(_))));
    }
}
