//! provlink: serial provisioning transport for embedded targets.
//!
//! Turns the unreliable, line-oriented, half-duplex serial console of a
//! target device into a reliable request/response and bulk PEM transfer
//! protocol: commands are verified against the target's local echo,
//! responses are collected up to the `"> "` prompt with timeout detection
//! and error classification, PEM blocks (keys, CSRs, certificates) are
//! transferred with mandatory readback verification, and configuration
//! edits are staged locally and committed in one batch.
//!
//! # Modules
//!
//! - `port`: byte channel abstraction (real serial ports and scripted mocks)
//! - `device`: the transport session and its error taxonomy
//! - `config`: TOML configuration with environment overrides
//!
//! # Example
//!
//! ```no_run
//! use provlink::device::DeviceSession;
//!
//! let mut session = DeviceSession::connect("/dev/ttyUSB0", 115_200)?;
//! session.conf_set("thing_name", "device42");
//! session.conf_commit()?;
//! let public_key = session.generate_key(None)?;
//! # Ok::<(), provlink::device::DeviceError>(())
//! ```

pub mod config;
pub mod device;
pub mod port;

// Re-export commonly used types for convenience.
pub use config::{Config, ConfigLoader};
pub use device::{DeviceError, DeviceSession, Timeouts};
pub use port::{ByteChannel, MockPort, PortError, SyncSerialPort};
