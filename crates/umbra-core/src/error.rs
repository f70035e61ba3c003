//! Unified error types for the umbra core library.
//!
//! This module provides a unified error type [`UmbraError`] that covers all failure
//! modes across the umbra system. Each module also has its own specific error types
//! (`ConfigError`, `StoreError`, `ScannerError`) for internal use. Action
//! failures are not errors here: the gate reports them as an `ActionReport`.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Error messages guide users toward resolution
//! - **Context preservation**: Wrapped errors maintain their original context
//! - **HTTP-ready**: Error types include HTTP status codes and error codes
//!
//! Nothing in the monitoring loop itself is fatal: these errors surface from
//! startup, persistence and the command API, never from a tick.
//!
//! # Example
//!
//! ```rust
//! use umbra_core::error::{UmbraError, Result};
//! use std::path::PathBuf;
//!
//! fn load_devices(path: &PathBuf) -> Result<()> {
//!     if !path.exists() {
//!         return Err(UmbraError::ConfigNotFound(path.clone()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::scanner::RadioState;

/// The unified error type for all umbra operations.
#[derive(Debug, Error)]
pub enum UmbraError {
    // =========================================================================
    // BLUETOOTH ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    BluetoothAdapterNotFound,

    /// The Bluetooth radio is not ready to scan.
    #[error("Bluetooth radio is {0}. Run 'bluetoothctl power on' to enable scanning.")]
    RadioUnavailable(RadioState),

    /// Bluetooth scanning failed.
    #[error("Bluetooth scan failed: {0}")]
    BluetoothScanFailed(String),

    /// The requested device is neither monitored nor discovered.
    #[error("Device not found: '{0}'. Start a discovery scan and make sure the device is advertising.")]
    DeviceNotFound(String),

    /// The device identifier is not a valid Bluetooth address.
    #[error("Invalid device id: '{0}'. Expected format XX:XX:XX:XX:XX:XX.")]
    InvalidDeviceId(String),

    // =========================================================================
    // MONITOR ERRORS
    // =========================================================================
    /// The monitor task has shut down and no longer accepts commands.
    #[error("Monitor is not running; the service may be shutting down")]
    MonitorUnavailable,

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

/// A specialized [`Result`] type for umbra operations.
pub type Result<T> = std::result::Result<T, UmbraError>;

/// Short alias for [`UmbraError`].
pub type Error = UmbraError;

impl UmbraError {
    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidDeviceId(_) => 400,

            Self::ConfigNotFound(_) | Self::DeviceNotFound(_) => 404,

            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            Self::PersistenceError(_) => 500,

            Self::BluetoothAdapterNotFound
            | Self::RadioUnavailable(_)
            | Self::BluetoothScanFailed(_)
            | Self::MonitorUnavailable => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BluetoothAdapterNotFound => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::RadioUnavailable(_) => "RADIO_UNAVAILABLE",
            Self::BluetoothScanFailed(_) => "BLUETOOTH_SCAN_FAILED",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::InvalidDeviceId(_) => "INVALID_DEVICE_ID",
            Self::MonitorUnavailable => "MONITOR_UNAVAILABLE",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for UmbraError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {}: {}", path.display(), source))
            }
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {}", path.display(), source))
            }
            ConfigError::LoadError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::storage::StoreError> for UmbraError {
    fn from(err: crate::storage::StoreError) -> Self {
        use crate::storage::StoreError;
        match err {
            StoreError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {}: {}", path.display(), source))
            }
            StoreError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {}", path.display(), source))
            }
            StoreError::ParseError { path, source } => Self::PersistenceError(format!(
                "Failed to parse {}: {}",
                path.display(),
                source
            )),
            StoreError::SerializeError(e) => Self::PersistenceError(e.to_string()),
            StoreError::CreateDirError { path, source } => Self::PersistenceError(format!(
                "Failed to create directory {}: {}",
                path.display(),
                source
            )),
            StoreError::DuplicateDevice(id) => {
                Self::PersistenceError(format!("Duplicate device id in store: {id}"))
            }
        }
    }
}

impl From<crate::scanner::ScannerError> for UmbraError {
    fn from(err: crate::scanner::ScannerError) -> Self {
        use crate::scanner::ScannerError;
        match err {
            ScannerError::AdapterNotFound => Self::BluetoothAdapterNotFound,
            ScannerError::RadioNotReady(state) => Self::RadioUnavailable(state),
            ScannerError::SessionInitFailed { message }
            | ScannerError::DiscoveryFailed { message } => Self::BluetoothScanFailed(message),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
