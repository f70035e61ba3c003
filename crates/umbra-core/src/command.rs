//! Command API for the monitor task.
//!
//! Every UI request becomes a [`Command`] sent to the task that owns the
//! core state, paired with a oneshot channel for the answer.
//! [`MonitorHandle`] wraps that round trip in typed async methods.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::device::{DeviceType, DiscoveredDevice, MonitoredDevice, SignalStrength};
use crate::error::{Result, UmbraError};
use crate::gate::ActionReport;
use crate::scanner::RadioState;
use crate::scheduler::ScanState;
use crate::tracker::DeviceState;
use crate::types::{DeviceId, Timestamp};

/// Capacity of the command queue.
pub const COMMAND_QUEUE_CAPACITY: usize = 32;

/// A command envelope sent through the command channel.
#[derive(Debug)]
pub struct CommandEnvelope {
    /// What to do.
    pub command: Command,
    /// Where the answer goes.
    pub response_tx: oneshot::Sender<Result<CommandResult>>,
}

/// Every operation the monitor task accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start monitoring.
    Start,
    /// Stop monitoring.
    Stop,
    /// Report the current status.
    Status,
    /// List monitored devices with live state.
    MonitoredDevices,
    /// List devices heard in the current discovery window.
    DiscoveredDevices,
    /// Open a discovery window.
    StartDiscovery,
    /// Close the discovery window.
    StopDiscovery,
    /// Add or remove a device from the monitored set.
    ToggleMonitoring {
        /// The device.
        id: DeviceId,
    },
    /// Fire the action now, bypassing the cooldown.
    TestAction,
}

/// Answer to a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// For `Start`, `Stop`, `Status`, `StartDiscovery`, `StopDiscovery`.
    Status(MonitorStatus),
    /// For `MonitoredDevices`.
    Devices(Vec<DeviceStatus>),
    /// For `DiscoveredDevices`.
    Discovered(Vec<DiscoveredDevice>),
    /// For `ToggleMonitoring`.
    Toggled(ToggleOutcome),
    /// For `TestAction`.
    Action(TestActionOutcome),
}

/// Snapshot of the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MonitorStatus {
    /// Whether monitoring was started.
    pub running: bool,
    /// Whether monitoring is paused because the session is locked.
    pub paused: bool,
    /// What the radio is doing.
    pub scan_state: ScanState,
    /// Radio readiness.
    pub radio: RadioState,
    /// Number of monitored devices.
    pub monitored_count: usize,
    /// Whether the lock action is enabled.
    pub auto_lock_enabled: bool,
    /// When the action last fired.
    #[schema(value_type = Option<String>, format = DateTime)]
    pub last_triggered_at: Option<Timestamp>,
    /// Whether an action is being performed right now.
    pub action_in_flight: bool,
    /// How the last action ended.
    pub last_action: Option<ActionReport>,
    /// End of the running discovery window.
    #[schema(value_type = Option<String>, format = DateTime)]
    pub discovery_ends_at: Option<Timestamp>,
}

/// A monitored device together with what the monitor knows about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeviceStatus {
    /// Radio address.
    pub id: DeviceId,
    /// Display name.
    pub name: String,
    /// Inferred category.
    pub device_type: DeviceType,
    /// Live proximity state.
    pub state: DeviceState,
    /// Bucketed strength of the last reading.
    pub signal_strength: Option<SignalStrength>,
    /// Whether the device currently counts as in range.
    pub in_range: bool,
}

/// Result of toggling a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ToggleOutcome {
    /// The device that was toggled.
    pub device: MonitoredDevice,
    /// Whether it is monitored now.
    pub is_monitored: bool,
}

/// Result of a test action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TestActionOutcome {
    /// Whether the action was dispatched.
    pub fired: bool,
    /// Id of the dispatched action.
    pub action_id: Option<Uuid>,
    /// Why nothing was dispatched.
    pub reason: Option<String>,
}

/// Cloneable handle to a running monitor task.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<CommandEnvelope>,
}

impl MonitorHandle {
    /// Wraps the sending half of a command queue.
    #[must_use]
    pub const fn new(commands: mpsc::Sender<CommandEnvelope>) -> Self {
        Self { commands }
    }

    /// Sends a command and waits for the answer.
    ///
    /// # Errors
    ///
    /// Returns the command's own error, or `MonitorUnavailable` if the
    /// task is gone.
    pub async fn execute(&self, command: Command) -> Result<CommandResult> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| UmbraError::MonitorUnavailable)?;
        rx.await.map_err(|_| UmbraError::MonitorUnavailable)?
    }

    async fn status_of(&self, command: Command) -> Result<MonitorStatus> {
        match self.execute(command).await? {
            CommandResult::Status(status) => Ok(status),
            _ => Err(UmbraError::MonitorUnavailable),
        }
    }

    /// Starts monitoring. Starting twice is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the monitor task is gone.
    pub async fn start(&self) -> Result<MonitorStatus> {
        self.status_of(Command::Start).await
    }

    /// Stops monitoring and cancels a pending action.
    ///
    /// # Errors
    ///
    /// Fails if the monitor task is gone.
    pub async fn stop(&self) -> Result<MonitorStatus> {
        self.status_of(Command::Stop).await
    }

    /// Current status.
    ///
    /// # Errors
    ///
    /// Fails if the monitor task is gone.
    pub async fn status(&self) -> Result<MonitorStatus> {
        self.status_of(Command::Status).await
    }

    /// Monitored devices with live state.
    ///
    /// # Errors
    ///
    /// Fails if the monitor task is gone.
    pub async fn monitored_devices(&self) -> Result<Vec<DeviceStatus>> {
        match self.execute(Command::MonitoredDevices).await? {
            CommandResult::Devices(devices) => Ok(devices),
            _ => Err(UmbraError::MonitorUnavailable),
        }
    }

    /// Devices heard in the current discovery window, strongest first.
    ///
    /// # Errors
    ///
    /// Fails if the monitor task is gone.
    pub async fn discovered_devices(&self) -> Result<Vec<DiscoveredDevice>> {
        match self.execute(Command::DiscoveredDevices).await? {
            CommandResult::Discovered(devices) => Ok(devices),
            _ => Err(UmbraError::MonitorUnavailable),
        }
    }

    /// Opens a discovery window.
    ///
    /// # Errors
    ///
    /// `RadioUnavailable` when the radio is not ready, or a scan failure.
    pub async fn start_discovery(&self) -> Result<MonitorStatus> {
        self.status_of(Command::StartDiscovery).await
    }

    /// Closes the discovery window.
    ///
    /// # Errors
    ///
    /// Fails if the monitor task is gone.
    pub async fn stop_discovery(&self) -> Result<MonitorStatus> {
        self.status_of(Command::StopDiscovery).await
    }

    /// Adds a discovered device to the monitored set, or removes a
    /// monitored one.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` for an id that is neither monitored nor discovered;
    /// a persistence error if the list cannot be saved.
    pub async fn toggle_monitoring(&self, id: DeviceId) -> Result<ToggleOutcome> {
        match self.execute(Command::ToggleMonitoring { id }).await? {
            CommandResult::Toggled(outcome) => Ok(outcome),
            _ => Err(UmbraError::MonitorUnavailable),
        }
    }

    /// Fires the action now, bypassing only the cooldown.
    ///
    /// # Errors
    ///
    /// Fails if the monitor task is gone.
    pub async fn test_action(&self) -> Result<TestActionOutcome> {
        match self.execute(Command::TestAction).await? {
            CommandResult::Action(outcome) => Ok(outcome),
            _ => Err(UmbraError::MonitorUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_reports_unavailable_when_task_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = MonitorHandle::new(tx);
        assert!(matches!(
            handle.status().await,
            Err(UmbraError::MonitorUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let (tx, mut rx) = mpsc::channel::<CommandEnvelope>(1);
        let handle = MonitorHandle::new(tx);

        tokio::spawn(async move {
            let envelope = rx.recv().await.unwrap();
            assert_eq!(envelope.command, Command::DiscoveredDevices);
            let _ = envelope
                .response_tx
                .send(Ok(CommandResult::Discovered(Vec::new())));
        });

        assert!(handle.discovered_devices().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_answer_is_an_error() {
        let (tx, mut rx) = mpsc::channel::<CommandEnvelope>(1);
        let handle = MonitorHandle::new(tx);

        tokio::spawn(async move {
            let envelope = rx.recv().await.unwrap();
            let _ = envelope
                .response_tx
                .send(Ok(CommandResult::Devices(Vec::new())));
        });

        assert!(handle.status().await.is_err());
    }
}
