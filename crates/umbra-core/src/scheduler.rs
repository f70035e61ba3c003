//! Scan duty cycle.
//!
//! [`ScanScheduler`] resolves the inputs (radio readiness, monitoring
//! intent, pause flag, discovery window) into a single [`ScanState`] and
//! only talks to the [`Scanner`] when that state, or the scan mode it
//! needs, changes.
//!
//! | State              | Scanner                  |
//! |--------------------|--------------------------|
//! | `Discovering`      | `start(monitoring)`      |
//! | `Monitoring`       | `start(true)`            |
//! | anything else      | `stop()`                 |
//!
//! A discovery window opened while monitoring is wanted keeps the scan
//! continuous, so monitored devices go on reporting through it.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::scanner::{RadioState, Scanner, ScannerError, ScannerResult};
use crate::types::Timestamp;

/// Length of a discovery window.
pub const DISCOVERY_WINDOW_SECS: i64 = 30;

/// What the radio is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    /// Not scanning, nothing wanted.
    Idle,
    /// Timed scan collecting nearby devices.
    Discovering,
    /// Continuous scan of the monitored devices.
    Monitoring,
    /// Monitoring wanted, but the action is in effect.
    MonitoringPaused,
    /// Scanning wanted, but the radio is unavailable or refused to start.
    Suspended,
}

/// Drives a [`Scanner`] from the monitor's intent.
pub struct ScanScheduler {
    scanner: Box<dyn Scanner>,
    state: ScanState,
    continuous: bool,
    radio: RadioState,
    monitoring: bool,
    paused: bool,
    discovery_until: Option<Timestamp>,
    discovery_window: Duration,
}

impl std::fmt::Debug for ScanScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanScheduler")
            .field("state", &self.state)
            .field("radio", &self.radio)
            .field("monitoring", &self.monitoring)
            .field("paused", &self.paused)
            .field("discovery_until", &self.discovery_until)
            .finish_non_exhaustive()
    }
}

impl ScanScheduler {
    /// Creates an idle scheduler. The radio is treated as unknown until
    /// [`set_radio`](Self::set_radio) is called.
    #[must_use]
    pub fn new(scanner: Box<dyn Scanner>) -> Self {
        Self {
            scanner,
            state: ScanState::Idle,
            continuous: false,
            radio: RadioState::Unknown,
            monitoring: false,
            paused: false,
            discovery_until: None,
            discovery_window: Duration::seconds(DISCOVERY_WINDOW_SECS),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ScanState {
        self.state
    }

    /// Last reported radio state.
    #[must_use]
    pub const fn radio(&self) -> RadioState {
        self.radio
    }

    /// End of the running discovery window.
    #[must_use]
    pub const fn discovery_deadline(&self) -> Option<Timestamp> {
        self.discovery_until
    }

    /// Whether a discovery window is open.
    #[must_use]
    pub const fn is_discovering(&self) -> bool {
        self.discovery_until.is_some()
    }

    /// Applies a radio change. Losing the radio ends any discovery window.
    pub fn set_radio(&mut self, radio: RadioState) -> ScanState {
        if radio != self.radio {
            info!(%radio, "radio state changed");
        }
        self.radio = radio;
        if !radio.is_ready() && self.discovery_until.take().is_some() {
            info!("discovery cancelled, radio unavailable");
        }
        self.resync()
    }

    /// Sets whether continuous monitoring is wanted.
    pub fn set_monitoring(&mut self, monitoring: bool) -> ScanState {
        self.monitoring = monitoring;
        self.resync()
    }

    /// Sets whether monitoring is paused because the action is in effect.
    pub fn set_paused(&mut self, paused: bool) -> ScanState {
        self.paused = paused;
        self.resync()
    }

    /// Opens (or reopens) a discovery window ending `DISCOVERY_WINDOW_SECS`
    /// after `now`.
    ///
    /// # Errors
    ///
    /// Fails if the radio is not ready or the scanner refuses to start; no
    /// window is left open in either case.
    pub fn start_discovery(&mut self, now: Timestamp) -> ScannerResult<()> {
        if !self.radio.is_ready() {
            return Err(ScannerError::RadioNotReady(self.radio));
        }
        self.discovery_until = Some(now + self.discovery_window);
        if let Err(e) = self.sync() {
            self.discovery_until = None;
            self.resync();
            return Err(e);
        }
        info!("discovery started");
        Ok(())
    }

    /// Closes the discovery window, if any.
    pub fn stop_discovery(&mut self) -> ScanState {
        if self.discovery_until.take().is_some() {
            info!("discovery stopped");
        }
        self.resync()
    }

    /// Closes the discovery window once its deadline has passed. Returns
    /// whether it did.
    pub fn expire_discovery(&mut self, now: Timestamp) -> bool {
        match self.discovery_until {
            Some(deadline) if now >= deadline => {
                self.discovery_until = None;
                info!("discovery window elapsed");
                self.resync();
                true
            }
            _ => false,
        }
    }

    /// Re-resolves the state, retrying a scanner start that failed earlier.
    pub fn resync(&mut self) -> ScanState {
        // Failures are logged by `sync` and leave the state `Suspended`.
        let _ = self.sync();
        self.state
    }

    fn resolve(&self) -> ScanState {
        if !self.radio.is_ready() {
            return if self.monitoring {
                ScanState::Suspended
            } else {
                ScanState::Idle
            };
        }
        if self.discovery_until.is_some() {
            ScanState::Discovering
        } else if self.monitoring && self.paused {
            ScanState::MonitoringPaused
        } else if self.monitoring {
            ScanState::Monitoring
        } else {
            ScanState::Idle
        }
    }

    fn sync(&mut self) -> ScannerResult<ScanState> {
        let desired = self.resolve();
        let continuous = match desired {
            ScanState::Monitoring => true,
            ScanState::Discovering => self.monitoring,
            _ => false,
        };
        if desired == self.state && continuous == self.continuous {
            return Ok(desired);
        }

        let result = match desired {
            ScanState::Discovering | ScanState::Monitoring => self.scanner.start(continuous),
            ScanState::Idle | ScanState::MonitoringPaused | ScanState::Suspended => {
                self.scanner.stop();
                Ok(())
            }
        };

        match result {
            Ok(()) => {
                info!(from = ?self.state, to = ?desired, continuous, "scan state changed");
                self.state = desired;
                self.continuous = continuous;
                Ok(desired)
            }
            Err(e) => {
                warn!(error = %e, wanted = ?desired, "scanner failed to start");
                self.state = ScanState::Suspended;
                self.continuous = false;
                Err(e)
            }
        }
    }
}
