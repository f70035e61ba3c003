//! The radio seam.
//!
//! A [`Scanner`] turns the radio on and off; everything it hears comes back
//! through a [`ScanSink`]. Sightings travel over a bounded queue that never
//! blocks the radio stack, radio readiness over a `watch` channel so the
//! latest state always wins.

use std::fmt;
#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::trace;
use utoipa::ToSchema;

use crate::types::SightingEvent;

/// Readings at or below this strength are noise and never reach the core.
pub const NOISE_FLOOR_DBM: i16 = -100;

/// Capacity of the sighting queue between scanner and controller.
pub const SIGHTING_QUEUE_CAPACITY: usize = 1024;

/// Readiness of the Bluetooth radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RadioState {
    /// Not reported yet.
    Unknown,
    /// Powered and usable.
    Ready,
    /// Adapter present but powered off.
    PoweredOff,
    /// The process may not use the adapter.
    Unauthorized,
    /// No usable adapter.
    Unsupported,
}

impl RadioState {
    /// Whether scans can be started.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Ready => "ready",
            Self::PoweredOff => "powered off",
            Self::Unauthorized => "unauthorized",
            Self::Unsupported => "unsupported",
        })
    }
}

/// Errors reported by a [`Scanner`].
#[derive(Debug, Error)]
pub enum ScannerError {
    /// No adapter exists.
    #[error("no Bluetooth adapter found")]
    AdapterNotFound,

    /// The radio cannot scan right now.
    #[error("Bluetooth radio is {0}")]
    RadioNotReady(RadioState),

    /// Connecting to the Bluetooth daemon failed.
    #[error("failed to open Bluetooth session: {message}")]
    SessionInitFailed {
        /// Daemon error text.
        message: String,
    },

    /// Starting discovery failed.
    #[error("discovery failed: {message}")]
    DiscoveryFailed {
        /// Daemon error text.
        message: String,
    },
}

/// Result type for scanner operations.
pub type ScannerResult<T> = std::result::Result<T, ScannerError>;

/// Radio control consumed by the scan scheduler.
///
/// Both calls return promptly; scanning itself happens in the background
/// and reports through the [`ScanSink`] the scanner was built with.
pub trait Scanner: Send {
    /// Starts scanning. `continuous` scans keep reporting duplicates of the
    /// same device, which monitoring needs; discovery scans may not.
    ///
    /// # Errors
    ///
    /// Returns an error if the radio refuses to scan.
    fn start(&mut self, continuous: bool) -> ScannerResult<()>;

    /// Stops scanning. Stopping an idle scanner is a no-op.
    fn stop(&mut self);
}

/// Producer half handed to a [`Scanner`].
#[derive(Debug, Clone)]
pub struct ScanSink {
    sightings: mpsc::Sender<SightingEvent>,
    radio: watch::Sender<RadioState>,
}

/// Consumer half owned by the monitor loop.
#[derive(Debug)]
pub struct ScanFeed {
    /// Sightings in arrival order.
    pub sightings: mpsc::Receiver<SightingEvent>,
    /// Latest radio state.
    pub radio: watch::Receiver<RadioState>,
}

impl ScanSink {
    /// Creates a connected sink/feed pair.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, ScanFeed) {
        let (sightings_tx, sightings_rx) = mpsc::channel(capacity);
        let (radio_tx, radio_rx) = watch::channel(RadioState::Unknown);
        (
            Self {
                sightings: sightings_tx,
                radio: radio_tx,
            },
            ScanFeed {
                sightings: sightings_rx,
                radio: radio_rx,
            },
        )
    }

    /// Delivers a sighting without blocking.
    ///
    /// Readings at or below the noise floor are discarded, as is anything
    /// that arrives while the queue is full. Returns whether it was queued.
    pub fn sighting(&self, event: SightingEvent) -> bool {
        if event.rssi <= NOISE_FLOOR_DBM {
            trace!(device = %event.device_id, rssi = event.rssi, "below noise floor");
            return false;
        }
        match self.sightings.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                trace!(device = %event.device_id, "sighting queue full, dropping");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Publishes a radio state change. Repeats of the current state are ignored.
    pub fn radio(&self, state: RadioState) {
        self.radio.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

/// Stand-in used when no adapter could be opened. Every start fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableScanner;

impl Scanner for UnavailableScanner {
    fn start(&mut self, _continuous: bool) -> ScannerResult<()> {
        Err(ScannerError::AdapterNotFound)
    }

    fn stop(&mut self) {}
}

/// A scanner command, as recorded by [`MockScanner`].
#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCommand {
    /// `start(continuous)`.
    Start {
        /// Whether the scan was continuous.
        continuous: bool,
    },
    /// `stop()`.
    Stop,
}

/// A fake beacon the [`MockScanner`] reports while scanning.
#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    /// Radio address.
    pub id: crate::types::DeviceId,
    /// Advertised name.
    pub name: String,
    /// Reported signal strength.
    pub rssi: i16,
}

/// In-memory scanner for tests and hardware-less runs.
///
/// Records every command. When built with [`MockDevice`]s it reports each of
/// them once per second while a scan is active.
#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
#[derive(Debug, Clone)]
pub struct MockScanner {
    sink: ScanSink,
    commands: Arc<Mutex<Vec<ScanCommand>>>,
    devices: Arc<Mutex<Vec<MockDevice>>>,
    fail_start: Arc<std::sync::atomic::AtomicBool>,
    emitter: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
impl MockScanner {
    /// Creates a mock that reports the radio as ready.
    #[must_use]
    pub fn new(sink: ScanSink) -> Self {
        sink.radio(RadioState::Ready);
        Self {
            sink,
            commands: Arc::default(),
            devices: Arc::default(),
            fail_start: Arc::default(),
            emitter: Arc::default(),
        }
    }

    /// Adds beacons to report while scanning.
    #[must_use]
    pub fn with_devices(self, devices: Vec<MockDevice>) -> Self {
        if let Ok(mut current) = self.devices.lock() {
            current.extend(devices);
        }
        self
    }

    /// Every command received so far.
    #[must_use]
    pub fn commands(&self) -> Vec<ScanCommand> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// The most recent command.
    #[must_use]
    pub fn last_command(&self) -> Option<ScanCommand> {
        self.commands.lock().ok().and_then(|c| c.last().copied())
    }

    /// Makes subsequent `start` calls fail.
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Simulates the radio changing state.
    pub fn set_radio(&self, state: RadioState) {
        self.sink.radio(state);
    }

    /// Injects one sighting as if it had been heard.
    pub fn emit(&self, event: SightingEvent) -> bool {
        self.sink.sighting(event)
    }

    fn record(&self, command: ScanCommand) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command);
        }
    }

    fn stop_emitter(&self) {
        if let Ok(mut emitter) = self.emitter.lock() {
            if let Some(handle) = emitter.take() {
                handle.abort();
            }
        }
    }

    fn spawn_emitter(&self) {
        let devices = self.devices.lock().map(|d| d.clone()).unwrap_or_default();
        if devices.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let sink = self.sink.clone();
        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
            loop {
                interval.tick().await;
                let now = chrono::Utc::now();
                for device in &devices {
                    sink.sighting(
                        SightingEvent::new(device.id.clone(), device.rssi, now)
                            .with_name(device.name.clone()),
                    );
                }
            }
        });
        if let Ok(mut emitter) = self.emitter.lock() {
            *emitter = Some(handle);
        }
    }
}

#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
impl Scanner for MockScanner {
    fn start(&mut self, continuous: bool) -> ScannerResult<()> {
        self.record(ScanCommand::Start { continuous });
        if self.fail_start.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ScannerError::DiscoveryFailed {
                message: "mock start failure".to_string(),
            });
        }
        self.stop_emitter();
        self.spawn_emitter();
        Ok(())
    }

    fn stop(&mut self) {
        self.record(ScanCommand::Stop);
        self.stop_emitter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceId;
    use chrono::Utc;

    fn sighting(rssi: i16) -> SightingEvent {
        SightingEvent::new(DeviceId::parse("AA:BB:CC:DD:EE:FF").unwrap(), rssi, Utc::now())
    }

    #[test]
    fn test_noise_floor_is_filtered() {
        let (sink, mut feed) = ScanSink::channel(4);
        assert!(!sink.sighting(sighting(-100)));
        assert!(!sink.sighting(sighting(-120)));
        assert!(sink.sighting(sighting(-99)));
        assert_eq!(feed.sightings.try_recv().unwrap().rssi, -99);
        assert!(feed.sightings.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let (sink, _feed) = ScanSink::channel(2);
        assert!(sink.sighting(sighting(-50)));
        assert!(sink.sighting(sighting(-50)));
        assert!(!sink.sighting(sighting(-50)));
    }

    #[test]
    fn test_radio_state_latest_wins() {
        let (sink, mut feed) = ScanSink::channel(1);
        assert_eq!(*feed.radio.borrow(), RadioState::Unknown);

        sink.radio(RadioState::Ready);
        sink.radio(RadioState::PoweredOff);
        assert!(feed.radio.has_changed().unwrap());
        assert_eq!(*feed.radio.borrow_and_update(), RadioState::PoweredOff);

        sink.radio(RadioState::PoweredOff);
        assert!(!feed.radio.has_changed().unwrap());
    }

    #[test]
    fn test_mock_scanner_records_commands() {
        let (sink, feed) = ScanSink::channel(1);
        let mut scanner = MockScanner::new(sink);
        assert_eq!(*feed.radio.borrow(), RadioState::Ready);

        scanner.start(true).unwrap();
        scanner.stop();
        scanner.set_fail_start(true);
        assert!(scanner.start(false).is_err());

        assert_eq!(
            scanner.commands(),
            vec![
                ScanCommand::Start { continuous: true },
                ScanCommand::Stop,
                ScanCommand::Start { continuous: false },
            ]
        );
    }

    #[test]
    fn test_unavailable_scanner_never_starts() {
        let mut scanner = UnavailableScanner;
        assert!(matches!(
            scanner.start(true),
            Err(ScannerError::AdapterNotFound)
        ));
        scanner.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_scanner_reports_devices_while_scanning() {
        let (sink, mut feed) = ScanSink::channel(16);
        let mut scanner = MockScanner::new(sink).with_devices(vec![MockDevice {
            id: DeviceId::parse("11:22:33:44:55:66").unwrap(),
            name: "Test Phone".to_string(),
            rssi: -55,
        }]);

        scanner.start(true).unwrap();
        let event = feed.sightings.recv().await.unwrap();
        assert_eq!(event.rssi, -55);
        assert_eq!(event.name.as_deref(), Some("Test Phone"));

        scanner.stop();
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        while feed.sightings.try_recv().is_ok() {}
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert!(feed.sightings.try_recv().is_err());
    }
}
