//! # umbra-core
//!
//! Core proximity engine for umbra: lock the session once every trusted
//! Bluetooth device has walked away.
//!
//! This crate provides:
//! - Per-device proximity state built from Bluetooth LE sightings
//! - A debounced all-devices-out-of-range rule
//! - A cooldown gate around the lock action
//! - Scan duty-cycling (discovery window, continuous monitoring, pause)
//! - Configuration and device list persistence
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`tracker`] - Monitored device id to [`DeviceState`] mapping
//! - [`debounce`] - The in-range test and the per-device debounce rule
//! - [`gate`] - Cooldown and single-flight dispatch of the lock action
//! - [`scheduler`] - Scan state machine driving the [`Scanner`]
//! - [`controller`] - The monitor task that owns all of the above
//! - [`command`] - Typed command API and [`MonitorHandle`]
//! - [`scanner`] - Scanner seam, sighting queue and the mock scanner
//! - `bluetooth` - BlueZ scanner (feature `bluetooth`)
//! - [`actuator`] - Session lock, notification and lock probe
//! - [`config`] - Application configuration loading, saving, and validation
//! - [`storage`] - Persistent device list using JSON files
//! - [`device`] - Device records and type classification
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared identifiers and the sighting event

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod actuator;
#[cfg(feature = "bluetooth")]
pub mod bluetooth;
pub mod command;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod device;
pub mod error;
pub mod gate;
pub mod scanner;
pub mod scheduler;
pub mod storage;
pub mod tracker;
pub mod types;

// Re-export primary types for convenience
pub use actuator::{
    ActionProbe, Actuator, ActuatorError, DesktopNotifier, DryRunActuator, NeverInEffect,
    Notifier, SessionLockProbe, SessionLocker,
};
#[cfg(feature = "bluetooth")]
pub use bluetooth::BluezScanner;
pub use command::{
    Command, DeviceStatus, MonitorHandle, MonitorStatus, TestActionOutcome, ToggleOutcome,
};
pub use config::{
    default_config_path, Config, ConfigError, ConfigResult, MonitorConfig, MonitorSettings,
    NotificationsConfig, ServerConfig, MAX_LOCK_DELAY_SECS, MAX_NOTICE_DELAY_MS,
    MAX_RSSI_THRESHOLD, MIN_RSSI_THRESHOLD,
};
pub use controller::{MonitorController, MonitorParts, PROBE_TIMEOUT, TICK_INTERVAL};
pub use debounce::{DebounceEngine, Decision, Evaluation, STALENESS_WINDOW_SECS};
pub use device::{DeviceType, DiscoveredDevice, MonitoredDevice, SignalStrength};
pub use error::{Error, Result, UmbraError};
pub use gate::{
    ActionGate, ActionOutcome, ActionReport, GateOutcome, SuppressReason, MINIMUM_INTERVAL_SECS,
};
#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub use scanner::{MockDevice, MockScanner, ScanCommand};
pub use scanner::{
    RadioState, ScanFeed, ScanSink, Scanner, ScannerError, ScannerResult, UnavailableScanner,
    SIGHTING_QUEUE_CAPACITY,
};
pub use scheduler::{ScanScheduler, ScanState, DISCOVERY_WINDOW_SECS};
pub use storage::{default_data_dir, DeviceStore, StoreError, StoreResult};
pub use tracker::{DeviceState, ProximityTracker};
pub use types::{is_valid_mac_address, DeviceId, SightingEvent, Timestamp};
