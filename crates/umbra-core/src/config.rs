//! Application configuration management.
//!
//! Handles loading, saving, and validating umbra configuration including:
//! - RSSI threshold and lock delay for the proximity engine
//! - Whether auto-lock is enabled
//! - Pre-lock notifications
//! - HTTP server bind address
//!
//! Files are TOML. Loading layers `UMBRA__SECTION__KEY` environment variables
//! on top of the file (e.g. `UMBRA__MONITOR__LOCK_DELAY_SECS=30`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "UMBRA_CONFIG";

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "UMBRA";

/// Lowest RSSI threshold accepted, in dBm.
pub const MIN_RSSI_THRESHOLD: i16 = -100;

/// Highest RSSI threshold accepted, in dBm.
pub const MAX_RSSI_THRESHOLD: i16 = 0;

/// Longest lock delay accepted through validation, in seconds.
pub const MAX_LOCK_DELAY_SECS: i64 = 3600;

/// Longest pause between the notification and the lock, in milliseconds.
pub const MAX_NOTICE_DELAY_MS: u64 = 10_000;

/// Errors from loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    ReadError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    WriteError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The configuration sources could not be merged or deserialized.
    #[error("failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    /// The configuration could not be serialized to TOML.
    #[error("failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field failed validation.
    #[error("invalid {field}: {message}")]
    ValidationError {
        /// Field path, e.g. `monitor.rssi_threshold`.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields failed validation.
    #[error("{} validation errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Proximity engine settings.
    pub monitor: MonitorConfig,

    /// Pre-lock notification settings.
    pub notifications: NotificationsConfig,

    /// HTTP server settings.
    pub server: ServerConfig,
}

/// Proximity engine settings as stored on disk.
///
/// Values are kept as written; [`MonitorSettings::from`] clamps them before
/// the engine sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// RSSI at or above which a device counts as nearby.
    /// Typical values: -80 (far) to -50 (very close).
    pub rssi_threshold: i16,

    /// Seconds every device must stay out of range before locking.
    pub lock_delay_secs: i64,

    /// Master switch for the lock action.
    pub auto_lock_enabled: bool,

    /// Start monitoring on launch when devices are stored.
    pub start_on_launch: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rssi_threshold: -70,
            lock_delay_secs: 10,
            auto_lock_enabled: true,
            start_on_launch: true,
        }
    }
}

/// Pre-lock notification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Show a desktop notification before locking.
    pub enabled: bool,

    /// Pause between the notification and the lock, in milliseconds.
    pub notice_delay_ms: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            notice_delay_ms: 500,
        }
    }
}

impl NotificationsConfig {
    /// Notice delay as a [`Duration`]; zero when notifications are off.
    #[must_use]
    pub const fn notice_delay(&self) -> Duration {
        if self.enabled {
            Duration::from_millis(self.notice_delay_ms)
        } else {
            Duration::ZERO
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: String,

    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Engine-facing view of [`MonitorConfig`] with every value in bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// RSSI threshold in dBm, within `MIN_RSSI_THRESHOLD..=MAX_RSSI_THRESHOLD`.
    pub rssi_threshold: i16,
    /// Debounce window per device.
    pub lock_delay: chrono::Duration,
    /// Whether the gate may fire at all.
    pub auto_lock_enabled: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for MonitorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            rssi_threshold: config
                .rssi_threshold
                .clamp(MIN_RSSI_THRESHOLD, MAX_RSSI_THRESHOLD),
            lock_delay: chrono::Duration::seconds(config.lock_delay_secs.max(0)),
            auto_lock_enabled: config.auto_lock_enabled,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist. Environment overrides apply either way.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let defaults = config::Config::try_from(&Self::default())?;
        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Loads configuration from `path`; the file must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file is missing.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load_or_default(path)
    }

    /// Writes configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks every field and reports all violations at once.
    ///
    /// # Errors
    ///
    /// Returns the single violation, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if !(MIN_RSSI_THRESHOLD..=MAX_RSSI_THRESHOLD).contains(&self.monitor.rssi_threshold) {
            errors.push(ConfigError::ValidationError {
                field: "monitor.rssi_threshold",
                message: format!(
                    "must be between {MIN_RSSI_THRESHOLD} and {MAX_RSSI_THRESHOLD} dBm, got {}",
                    self.monitor.rssi_threshold
                ),
            });
        }

        if !(0..=MAX_LOCK_DELAY_SECS).contains(&self.monitor.lock_delay_secs) {
            errors.push(ConfigError::ValidationError {
                field: "monitor.lock_delay_secs",
                message: format!(
                    "must be between 0 and {MAX_LOCK_DELAY_SECS} seconds, got {}",
                    self.monitor.lock_delay_secs
                ),
            });
        }

        if self.notifications.notice_delay_ms > MAX_NOTICE_DELAY_MS {
            errors.push(ConfigError::ValidationError {
                field: "notifications.notice_delay_ms",
                message: format!("must be at most {MAX_NOTICE_DELAY_MS} ms"),
            });
        }

        if self.server.bind_address.trim().is_empty() {
            errors.push(ConfigError::ValidationError {
                field: "server.bind_address",
                message: "cannot be empty".to_string(),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Engine-facing monitor settings.
    #[must_use]
    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings::from(&self.monitor)
    }
}

/// Returns the configuration file path.
///
/// `UMBRA_CONFIG` wins; otherwise `config.toml` in the user's config
/// directory (`~/.config/umbra/` on Linux).
#[must_use]
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    directories::ProjectDirs::from("", "", "umbra")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("./config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.monitor.rssi_threshold, -70);
        assert_eq!(config.monitor.lock_delay_secs, 10);
        assert!(config.monitor.auto_lock_enabled);
        assert!(config.notifications.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.monitor, MonitorConfig::default());
    }

    #[test]
    fn test_load_requires_file() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.monitor.rssi_threshold = -62;
        config.monitor.lock_delay_secs = 25;
        config.notifications.enabled = false;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[monitor]\nlock_delay_secs = 30\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.monitor.lock_delay_secs, 30);
        assert_eq!(config.monitor.rssi_threshold, -70);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.monitor.rssi_threshold = 20;
        config.monitor.lock_delay_secs = -5;

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_settings_clamp_out_of_bounds_values() {
        let monitor = MonitorConfig {
            rssi_threshold: -150,
            lock_delay_secs: -5,
            auto_lock_enabled: true,
            start_on_launch: true,
        };
        let settings = MonitorSettings::from(&monitor);
        assert_eq!(settings.rssi_threshold, MIN_RSSI_THRESHOLD);
        assert_eq!(settings.lock_delay, chrono::Duration::zero());

        let monitor = MonitorConfig {
            rssi_threshold: 12,
            ..MonitorConfig::default()
        };
        assert_eq!(MonitorSettings::from(&monitor).rssi_threshold, MAX_RSSI_THRESHOLD);
    }

    #[test]
    fn test_notice_delay_respects_enabled() {
        let mut notifications = NotificationsConfig::default();
        assert_eq!(notifications.notice_delay(), Duration::from_millis(500));
        notifications.enabled = false;
        assert_eq!(notifications.notice_delay(), Duration::ZERO);
    }
}
