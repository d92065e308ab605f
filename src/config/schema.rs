//! Configuration schema definitions.

use crate::device::Timeouts;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial link configuration.
    pub serial: SerialConfig,
    /// Transport deadlines.
    pub transport: TransportConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Serial link section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`. Optional here; the CLI
    /// flag takes precedence and one of the two must be present.
    pub port: Option<String>,
    /// Baud rate for the provisioning console.
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115_200,
        }
    }
}

/// Transport deadline section. All values in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Waiting for a command echo.
    pub command_timeout_ms: u64,
    /// Waiting for a response to reach the prompt.
    pub response_timeout_ms: u64,
    /// Waiting for a requested PEM block.
    pub pem_read_timeout_ms: u64,
    /// Waiting for the echo of a written PEM block.
    pub pem_verify_timeout_ms: u64,
    /// Window in which an immediate rejection of a bulk-input command is
    /// caught before data is sent.
    pub error_probe_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        let defaults = Timeouts::default();
        Self {
            command_timeout_ms: defaults.command.as_millis() as u64,
            response_timeout_ms: defaults.response.as_millis() as u64,
            pem_read_timeout_ms: defaults.pem_read.as_millis() as u64,
            pem_verify_timeout_ms: defaults.pem_verify.as_millis() as u64,
            error_probe_ms: defaults.error_probe.as_millis() as u64,
        }
    }
}

impl TransportConfig {
    /// Convert the section into the session's deadline set.
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            command: Duration::from_millis(self.command_timeout_ms),
            response: Duration::from_millis(self.response_timeout_ms),
            pem_read: Duration::from_millis(self.pem_read_timeout_ms),
            pem_verify: Duration::from_millis(self.pem_verify_timeout_ms),
            error_probe: Duration::from_millis(self.error_probe_ms),
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_transport_defaults() {
        let config = Config::default();
        assert_eq!(config.serial.baud, 115_200);
        assert_eq!(config.transport.timeouts(), Timeouts::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [serial]
            port = "/dev/ttyACM1"

            [transport]
            pem_verify_timeout_ms = 10000
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(config.serial.baud, 115_200);
        assert_eq!(
            config.transport.timeouts().pem_verify,
            Duration::from_secs(10)
        );
        assert_eq!(config.transport.timeouts().command, Duration::from_secs(2));
    }
}
