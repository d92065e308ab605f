//! Byte channel abstraction over serial hardware.
//!
//! The transport session never talks to `serialport` directly; it goes
//! through the [`ByteChannel`] trait so that real ports and scripted mock
//! ports are interchangeable.

mod error;
mod mock;
mod sync_port;
mod traits;

pub use error::PortError;
pub use mock::MockPort;
pub use sync_port::SyncSerialPort;
pub use traits::ByteChannel;
