//! Configuration loader with file resolution and environment overrides.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "PROVLINK";

/// Config file name.
const CONFIG_FILE_NAME: &str = "provlink.toml";

/// Environment variable for an explicit config path.
const CONFIG_PATH_ENV: &str = "PROVLINK_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path, if any.
    pub config_path: Option<PathBuf>,
    /// The loaded configuration.
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using the standard resolution order, then apply
    /// environment overrides.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration, still honoring
    /// environment overrides.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        let _ = apply_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    if let Some(config_dir) = get_config_dir() {
        let app_config = config_dir.join("provlink").join(CONFIG_FILE_NAME);
        if app_config.exists() {
            return Some(app_config);
        }
    }

    None
}

/// Platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Apply `PROVLINK_<SECTION>_<KEY>` environment overrides.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERIAL_PORT")) {
        config.serial.port = Some(val);
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERIAL_BAUD")) {
        config.serial.baud = val.parse().map_err(|_| {
            ConfigError::env_parse(format!("{ENV_PREFIX}_SERIAL_BAUD"), "invalid baud rate")
        })?;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOGGING_LEVEL")) {
        config.logging.level = val;
    }

    override_ms(
        &mut config.transport.command_timeout_ms,
        "TRANSPORT_COMMAND_TIMEOUT_MS",
    )?;
    override_ms(
        &mut config.transport.response_timeout_ms,
        "TRANSPORT_RESPONSE_TIMEOUT_MS",
    )?;
    override_ms(
        &mut config.transport.pem_read_timeout_ms,
        "TRANSPORT_PEM_READ_TIMEOUT_MS",
    )?;
    override_ms(
        &mut config.transport.pem_verify_timeout_ms,
        "TRANSPORT_PEM_VERIFY_TIMEOUT_MS",
    )?;
    override_ms(&mut config.transport.error_probe_ms, "TRANSPORT_ERROR_PROBE_MS")?;

    Ok(())
}

fn override_ms(slot: &mut u64, suffix: &str) -> ConfigResult<()> {
    let var = format!("{ENV_PREFIX}_{suffix}");
    if let Ok(val) = std::env::var(&var) {
        *slot = val
            .parse()
            .map_err(|_| ConfigError::env_parse(var, "invalid millisecond value"))?;
    }
    Ok(())
}
