//! The device transport: line framing, command/response exchange, PEM
//! transfer, and the staged configuration cache.

mod error;
mod line;
mod session;

pub use error::DeviceError;
pub use line::LineChannel;
pub use session::{DeviceSession, Timeouts};
