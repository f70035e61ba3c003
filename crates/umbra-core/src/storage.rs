//! Persistent storage for the monitored device list.
//!
//! Devices are stored as a pretty-printed JSON array. The file is rewritten
//! through a temporary sibling and renamed into place, so a crash mid-write
//! leaves the previous list intact.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::device::MonitoredDevice;

const DEVICES_FILE: &str = "devices.json";

/// Errors from reading or writing the device store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    ReadError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The store file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    WriteError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The store file is not valid JSON.
    #[error("failed to parse {}: {source}", path.display())]
    ParseError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The device list could not be serialized.
    #[error("failed to serialize devices: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// The data directory could not be created.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirError {
        /// Directory path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The same device id appears twice.
    #[error("duplicate device id: {0}")]
    DuplicateDevice(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// File-backed store for [`MonitoredDevice`]s.
#[derive(Debug, Clone)]
pub struct DeviceStore {
    data_dir: PathBuf,
}

impl DeviceStore {
    /// Create a store rooted at `data_dir`.
    #[must_use]
    pub const fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Path of the device list file.
    #[must_use]
    pub fn devices_path(&self) -> PathBuf {
        self.data_dir.join(DEVICES_FILE)
    }

    /// Loads the device list; a missing file is an empty list. Repeated ids
    /// keep their first entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> StoreResult<Vec<MonitoredDevice>> {
        let path = self.devices_path();
        if !path.exists() {
            debug!(path = %path.display(), "no device store yet");
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| StoreError::ReadError {
            path: path.clone(),
            source,
        })?;
        let devices: Vec<MonitoredDevice> = serde_json::from_str(&content)
            .map_err(|source| StoreError::ParseError { path, source })?;

        Ok(dedupe(devices))
    }

    /// Replaces the stored device list.
    ///
    /// # Errors
    ///
    /// Returns an error if the list has duplicate ids or cannot be written.
    pub fn save(&self, devices: &[MonitoredDevice]) -> StoreResult<()> {
        ensure_unique(devices)?;
        create_dir(&self.data_dir)?;

        let path = self.devices_path();
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(devices)?;

        std::fs::write(&tmp, content).map_err(|source| StoreError::WriteError {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StoreError::WriteError { path, source })?;

        debug!(count = devices.len(), "saved monitored devices");
        Ok(())
    }
}

fn ensure_unique(devices: &[MonitoredDevice]) -> StoreResult<()> {
    let mut seen = HashSet::with_capacity(devices.len());
    for device in devices {
        if !seen.insert(&device.id) {
            return Err(StoreError::DuplicateDevice(device.id.to_string()));
        }
    }
    Ok(())
}

fn dedupe(devices: Vec<MonitoredDevice>) -> Vec<MonitoredDevice> {
    let mut seen = HashSet::with_capacity(devices.len());
    devices
        .into_iter()
        .filter(|device| {
            let first = seen.insert(device.id.clone());
            if !first {
                warn!(device = %device.id, name = %device.name, "dropping duplicate stored device");
            }
            first
        })
        .collect()
}

fn create_dir(path: &Path) -> StoreResult<()> {
    std::fs::create_dir_all(path).map_err(|source| StoreError::CreateDirError {
        path: path.to_path_buf(),
        source,
    })
}

/// Returns the default data directory: the user's data directory
/// (`~/.local/share/umbra/` on Linux).
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "umbra")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}
