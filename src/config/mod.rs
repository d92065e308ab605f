//! Configuration for provlink.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Resolution
//!
//! Configuration is loaded from the following locations, highest priority
//! first:
//!
//! 1. `PROVLINK_CONFIG` environment variable (explicit path)
//! 2. `./provlink.toml` (current directory)
//! 3. `~/.config/provlink/provlink.toml` (XDG on Linux/macOS) or
//!    `%APPDATA%\provlink\provlink.toml` (Windows)
//! 4. Built-in defaults (no file required)
//!
//! # Environment overrides
//!
//! Values can be overridden with `PROVLINK_<SECTION>_<KEY>` variables, for
//! example `PROVLINK_SERIAL_PORT=/dev/ttyACM0` or
//! `PROVLINK_LOGGING_LEVEL=debug`.

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{resolve_config_path, ConfigLoader};
pub use schema::{Config, LoggingConfig, SerialConfig, TransportConfig};
