//! Application state shared across handlers, and the monitor wiring.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use umbra_core::{
    default_data_dir, ActionProbe, Actuator, Config, ConfigResult, DesktopNotifier, DeviceStore,
    MonitorController, MonitorHandle, MonitorParts, ScanFeed, ScanSink, Scanner, Timestamp,
    SIGHTING_QUEUE_CAPACITY,
};

/// Handle passed to every handler.
pub type SharedState = Arc<AppState>;

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Command handle of the monitor task.
    pub monitor: MonitorHandle,
    config: watch::Sender<Config>,
    config_path: PathBuf,
    config_write: Mutex<()>,
    started_at: Timestamp,
}

impl AppState {
    /// Creates the state around a running monitor.
    #[must_use]
    pub fn new(monitor: MonitorHandle, config: watch::Sender<Config>, config_path: PathBuf) -> Self {
        Self {
            monitor,
            config,
            config_path,
            config_write: Mutex::new(()),
            started_at: Utc::now(),
        }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        self.config.borrow().clone()
    }

    /// When the server started.
    #[must_use]
    pub const fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Applies `change` to a copy of the configuration, validates and saves
    /// it, then publishes it to the monitor. Nothing changes on error.
    ///
    /// # Errors
    ///
    /// Returns a validation error or a write error.
    pub async fn update_config<F>(&self, change: F) -> ConfigResult<Config>
    where
        F: FnOnce(&mut Config),
    {
        let _guard = self.config_write.lock().await;
        let mut config = self.config();
        change(&mut config);
        config.validate()?;
        config.save(&self.config_path)?;
        self.config.send_replace(config.clone());
        info!(path = %self.config_path.display(), "configuration updated");
        Ok(config)
    }
}

/// The monitor task and what it needs to keep running.
#[derive(Debug)]
pub struct Monitor {
    /// Command handle.
    pub handle: MonitorHandle,
    /// The task itself.
    pub task: JoinHandle<()>,
}

/// Builds the platform scanner, actuator and probe and spawns the monitor.
///
/// # Errors
///
/// Returns an error if the stored device list cannot be read.
pub async fn start_monitor(
    config: watch::Receiver<Config>,
    shutdown: CancellationToken,
) -> anyhow::Result<Monitor> {
    let (sink, feed) = ScanSink::channel(SIGHTING_QUEUE_CAPACITY);
    let scanner = build_scanner(sink).await;
    let (actuator, probe) = build_actuator();

    let store = DeviceStore::new(default_data_dir());
    info!(path = %store.devices_path().display(), "using device store");

    spawn_monitor(
        MonitorParts {
            scanner,
            actuator,
            notifier: Some(Arc::new(DesktopNotifier)),
            probe,
            store,
        },
        config,
        feed,
        shutdown,
    )
}

/// Spawns a monitor from already-built parts.
///
/// # Errors
///
/// Returns an error if the stored device list cannot be read.
pub fn spawn_monitor(
    parts: MonitorParts,
    config: watch::Receiver<Config>,
    feed: ScanFeed,
    shutdown: CancellationToken,
) -> anyhow::Result<Monitor> {
    let controller = MonitorController::new(parts, config)?;
    let (handle, task) = controller.spawn(feed, shutdown);
    Ok(Monitor { handle, task })
}

#[cfg(all(feature = "bluetooth", not(feature = "mock-bluetooth")))]
async fn build_scanner(sink: ScanSink) -> Box<dyn Scanner> {
    match umbra_core::BluezScanner::new(sink.clone()).await {
        Ok(scanner) => Box::new(scanner),
        Err(e) => {
            warn!(error = %e, "Bluetooth unavailable, monitoring is suspended");
            sink.radio(umbra_core::RadioState::Unsupported);
            Box::new(umbra_core::UnavailableScanner)
        }
    }
}

#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth")))]
#[allow(clippy::unused_async)]
async fn build_scanner(sink: ScanSink) -> Box<dyn Scanner> {
    use umbra_core::{DeviceId, MockDevice, MockScanner};

    warn!("using mock Bluetooth scanner");
    let devices = [
        ("AA:BB:CC:DD:EE:01", "Demo iPhone", -55_i16),
        ("AA:BB:CC:DD:EE:02", "Demo Watch", -68_i16),
    ]
    .into_iter()
    .filter_map(|(id, name, rssi)| {
        DeviceId::parse(id).ok().map(|id| MockDevice {
            id,
            name: name.to_string(),
            rssi,
        })
    })
    .collect();
    Box::new(MockScanner::new(sink).with_devices(devices))
}

#[cfg(not(feature = "mock-bluetooth"))]
fn build_actuator() -> (Arc<dyn Actuator>, Arc<dyn ActionProbe>) {
    (
        Arc::new(umbra_core::SessionLocker),
        Arc::new(umbra_core::SessionLockProbe),
    )
}

#[cfg(feature = "mock-bluetooth")]
fn build_actuator() -> (Arc<dyn Actuator>, Arc<dyn ActionProbe>) {
    warn!("mock mode: the session will not actually be locked");
    (
        Arc::new(umbra_core::DryRunActuator),
        Arc::new(umbra_core::NeverInEffect),
    )
}
