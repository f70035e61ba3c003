//! The monitor task.
//!
//! [`MonitorController`] owns every piece of mutable core state: the
//! tracker, the gate, the scan scheduler, the device list and the discovery
//! results. One task runs [`MonitorController::run`], a `select!` loop over
//! sightings, radio changes, action reports, commands and a fixed tick, so
//! every state change happens on that task and in arrival order.
//!
//! Each tick, while running:
//! 1. ask the probe whether the session is already locked, on a blocking
//!    worker bounded by [`PROBE_TIMEOUT`]; if so, pause scanning and skip
//!    the evaluation
//! 2. otherwise resume and evaluate the debounce rule
//! 3. pass the decision to the gate; when it fires, reset every timer

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actuator::{ActionProbe, Actuator, Notifier};
use crate::command::{
    Command, CommandEnvelope, CommandResult, DeviceStatus, MonitorHandle, MonitorStatus,
    TestActionOutcome, ToggleOutcome, COMMAND_QUEUE_CAPACITY,
};
use crate::config::Config;
use crate::debounce::{DebounceEngine, Decision, Evaluation};
use crate::device::{DiscoveredDevice, MonitoredDevice};
use crate::error::{Result, UmbraError};
use crate::gate::{ActionGate, ActionReport, GateOutcome, SuppressReason};
use crate::scanner::{RadioState, ScanFeed, Scanner};
use crate::scheduler::ScanScheduler;
use crate::storage::DeviceStore;
use crate::tracker::ProximityTracker;
use crate::types::{DeviceId, SightingEvent, Timestamp};

/// Evaluation period.
pub const TICK_INTERVAL: StdDuration = StdDuration::from_secs(2);

/// How long a tick waits for the lock check. A slower answer counts as
/// unlocked.
pub const PROBE_TIMEOUT: StdDuration = StdDuration::from_secs(1);

/// Collaborators the controller is built from.
pub struct MonitorParts {
    /// Radio control.
    pub scanner: Box<dyn Scanner>,
    /// Performs the lock.
    pub actuator: Arc<dyn Actuator>,
    /// Announces the lock; `None` to stay silent.
    pub notifier: Option<Arc<dyn Notifier>>,
    /// Detects a session that is already locked.
    pub probe: Arc<dyn ActionProbe>,
    /// Where the device list lives.
    pub store: DeviceStore,
}

/// Owner of the core state. See the module docs for the tick.
pub struct MonitorController {
    tracker: ProximityTracker,
    engine: DebounceEngine,
    gate: ActionGate,
    scheduler: ScanScheduler,
    probe: Arc<dyn ActionProbe>,
    probe_timeout: StdDuration,
    store: DeviceStore,
    devices: Vec<MonitoredDevice>,
    discovered: HashMap<DeviceId, DiscoveredDevice>,
    config: watch::Receiver<Config>,
    reports: mpsc::UnboundedReceiver<ActionReport>,
    running: bool,
    paused: bool,
    last_report: Option<ActionReport>,
}

impl std::fmt::Debug for MonitorController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorController")
            .field("running", &self.running)
            .field("paused", &self.paused)
            .field("devices", &self.devices.len())
            .field("scheduler", &self.scheduler)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl MonitorController {
    /// Builds a stopped controller and loads the stored device list.
    ///
    /// # Errors
    ///
    /// Returns an error if the device list exists but cannot be read.
    pub fn new(parts: MonitorParts, config: watch::Receiver<Config>) -> Result<Self> {
        let devices = parts.store.load()?;
        info!(count = devices.len(), "loaded monitored devices");

        let mut tracker = ProximityTracker::new();
        tracker.set_monitored(devices.iter().map(|d| d.id.clone()));

        let (reports_tx, reports) = mpsc::unbounded_channel();
        let mut gate = ActionGate::new(parts.actuator, reports_tx);
        if let Some(notifier) = parts.notifier {
            gate = gate.with_notifier(notifier);
        }
        gate.configure_notice(&config.borrow().notifications);

        Ok(Self {
            tracker,
            engine: DebounceEngine::new(),
            gate,
            scheduler: ScanScheduler::new(parts.scanner),
            probe: parts.probe,
            probe_timeout: PROBE_TIMEOUT,
            store: parts.store,
            devices,
            discovered: HashMap::new(),
            config,
            reports,
            running: false,
            paused: false,
            last_report: None,
        })
    }

    /// Spawns the monitor task and returns a handle to it.
    ///
    /// The task ends when `shutdown` is cancelled or every handle is dropped.
    #[must_use]
    pub fn spawn(self, feed: ScanFeed, shutdown: CancellationToken) -> (MonitorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let task = tokio::spawn(self.run(feed, rx, shutdown));
        (MonitorHandle::new(tx), task)
    }

    /// Event loop. Prefer [`spawn`](Self::spawn).
    pub async fn run(
        mut self,
        mut feed: ScanFeed,
        mut commands: mpsc::Receiver<CommandEnvelope>,
        shutdown: CancellationToken,
    ) {
        let radio = *feed.radio.borrow_and_update();
        self.handle_radio(radio);

        let start_on_launch = self.config.borrow().monitor.start_on_launch;
        if start_on_launch && !self.devices.is_empty() {
            info!("starting monitoring on launch");
            self.start();
        }

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut radio_open = true;

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                Some(report) = self.reports.recv() => self.handle_report(report),
                envelope = commands.recv() => {
                    let Some(envelope) = envelope else { break };
                    let result = self.execute(envelope.command);
                    let _ = envelope.response_tx.send(result);
                }
                changed = feed.radio.changed(), if radio_open => {
                    if changed.is_err() {
                        warn!("radio feed closed");
                        radio_open = false;
                        self.handle_radio(RadioState::Unsupported);
                        continue;
                    }
                    let radio = *feed.radio.borrow_and_update();
                    self.handle_radio(radio);
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        _ = self.tick(Utc::now()) => {}
                    }
                }
                Some(event) = feed.sightings.recv() => self.handle_sighting(event),
            }
        }

        self.stop();
        info!("monitor task stopped");
    }

    /// Runs one command against the state.
    ///
    /// # Errors
    ///
    /// Returns whatever the command itself fails with.
    pub fn execute(&mut self, command: Command) -> Result<CommandResult> {
        let now = Utc::now();
        Ok(match command {
            Command::Start => CommandResult::Status(self.start()),
            Command::Stop => CommandResult::Status(self.stop()),
            Command::Status => CommandResult::Status(self.status()),
            Command::MonitoredDevices => CommandResult::Devices(self.monitored_devices(now)),
            Command::DiscoveredDevices => CommandResult::Discovered(self.discovered_devices()),
            Command::StartDiscovery => CommandResult::Status(self.start_discovery(now)?),
            Command::StopDiscovery => CommandResult::Status(self.stop_discovery()),
            Command::ToggleMonitoring { id } => {
                CommandResult::Toggled(self.toggle_monitoring(&id)?)
            }
            Command::TestAction => CommandResult::Action(self.test_action(now)),
        })
    }

    /// Starts monitoring. Idempotent.
    pub fn start(&mut self) -> MonitorStatus {
        if !self.running {
            info!(devices = self.devices.len(), "monitoring started");
            self.running = true;
            self.paused = false;
            self.scheduler.set_paused(false);
            self.sync_intent();
        }
        self.status()
    }

    /// Stops monitoring: clears every timer, drops the monitoring intent and
    /// cancels an action still in its notice delay. Idempotent.
    pub fn stop(&mut self) -> MonitorStatus {
        if self.running {
            info!("monitoring stopped");
        }
        self.running = false;
        self.paused = false;
        self.tracker.clear_timers();
        self.gate.cancel_pending();
        self.scheduler.set_paused(false);
        self.sync_intent();
        self.status()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            running: self.running,
            paused: self.paused,
            scan_state: self.scheduler.state(),
            radio: self.scheduler.radio(),
            monitored_count: self.devices.len(),
            auto_lock_enabled: self.config.borrow().monitor.auto_lock_enabled,
            last_triggered_at: self.gate.last_triggered_at(),
            action_in_flight: self.gate.is_in_flight(),
            last_action: self.last_report.clone(),
            discovery_ends_at: self.scheduler.discovery_deadline(),
        }
    }

    /// Monitored devices with their live state, in the stored order.
    #[must_use]
    pub fn monitored_devices(&self, now: Timestamp) -> Vec<DeviceStatus> {
        let settings = self.config.borrow().monitor_settings();
        self.devices
            .iter()
            .map(|device| {
                let state = self.tracker.state(&device.id).unwrap_or_default();
                DeviceStatus {
                    id: device.id.clone(),
                    name: device.name.clone(),
                    device_type: device.device_type,
                    signal_strength: state.signal_strength(),
                    in_range: self.engine.is_in_range(now, &state, &settings),
                    state,
                }
            })
            .collect()
    }

    /// Devices heard during the current discovery window, strongest first.
    #[must_use]
    pub fn discovered_devices(&self) -> Vec<DiscoveredDevice> {
        let mut devices: Vec<DiscoveredDevice> = self.discovered.values().cloned().collect();
        devices.sort_by(|a, b| b.rssi.cmp(&a.rssi).then_with(|| a.id.cmp(&b.id)));
        devices
    }

    /// Opens a fresh discovery window, forgetting earlier results.
    ///
    /// # Errors
    ///
    /// `RadioUnavailable` when the radio is not ready; `BluetoothScanFailed`
    /// when the scanner refuses to start.
    pub fn start_discovery(&mut self, now: Timestamp) -> Result<MonitorStatus> {
        self.scheduler.start_discovery(now)?;
        self.discovered.clear();
        Ok(self.status())
    }

    /// Closes the discovery window. Results stay available.
    pub fn stop_discovery(&mut self) -> MonitorStatus {
        self.scheduler.stop_discovery();
        self.status()
    }

    /// Adds a discovered device to the monitored set or removes a monitored
    /// one, then persists the list.
    ///
    /// Adding the first device starts monitoring; removing the last one
    /// stops it.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` if `id` is neither monitored nor discovered; a
    /// persistence error if saving fails, in which case nothing changes.
    pub fn toggle_monitoring(&mut self, id: &DeviceId) -> Result<ToggleOutcome> {
        let outcome = if let Some(index) = self.devices.iter().position(|d| &d.id == id) {
            let mut devices = self.devices.clone();
            let device = devices.remove(index);
            self.store.save(&devices)?;
            self.devices = devices;
            self.tracker.remove(id);
            info!(device = %id, name = %device.name, "device no longer monitored");
            ToggleOutcome {
                device,
                is_monitored: false,
            }
        } else if let Some(discovered) = self.discovered.get(id) {
            let device = discovered.to_monitored();
            let mut devices = self.devices.clone();
            devices.push(device.clone());
            self.store.save(&devices)?;
            self.devices = devices;
            self.tracker.add(id.clone());
            info!(device = %id, name = %device.name, "device now monitored");
            ToggleOutcome {
                device,
                is_monitored: true,
            }
        } else {
            return Err(UmbraError::DeviceNotFound(id.to_string()));
        };

        if let Some(discovered) = self.discovered.get_mut(id) {
            discovered.is_monitored = outcome.is_monitored;
        }
        if outcome.is_monitored && self.devices.len() == 1 && !self.running {
            self.start();
        } else if self.devices.is_empty() && self.running {
            self.stop();
        } else {
            self.sync_intent();
        }
        Ok(outcome)
    }

    /// Fires the action immediately, bypassing only the cooldown.
    pub fn test_action(&mut self, now: Timestamp) -> TestActionOutcome {
        let settings = self.config.borrow().monitor_settings();
        let outcome = self.fire(now, Decision::AllOutOfRange, settings.auto_lock_enabled, true);
        match outcome {
            GateOutcome::Fired { action_id } => TestActionOutcome {
                fired: true,
                action_id: Some(action_id),
                reason: None,
            },
            GateOutcome::Suppressed(reason) => TestActionOutcome {
                fired: false,
                action_id: None,
                reason: Some(reason.to_string()),
            },
        }
    }

    /// Applies one sighting.
    pub fn handle_sighting(&mut self, event: SightingEvent) {
        if self.scheduler.is_discovering() {
            let is_monitored = self.tracker.is_monitored(&event.device_id);
            self.discovered
                .entry(event.device_id.clone())
                .and_modify(|device| {
                    device.refresh(
                        event.rssi,
                        event.observed_at,
                        event.name.as_deref(),
                        event.company_id,
                    );
                })
                .or_insert_with(|| DiscoveredDevice::from_sighting(&event, is_monitored));
        }
        self.tracker.observe(&event);
    }

    /// Applies a radio change.
    pub fn handle_radio(&mut self, radio: RadioState) {
        self.scheduler.set_radio(radio);
    }

    /// Records the end of a dispatched action.
    pub fn handle_report(&mut self, report: ActionReport) {
        self.gate.complete(&report);
        self.last_report = Some(report);
    }

    /// One evaluation period. Returns the evaluation when one ran.
    pub async fn tick(&mut self, now: Timestamp) -> Option<Evaluation> {
        self.scheduler.expire_discovery(now);
        if !self.running {
            return None;
        }
        let locked = action_in_effect(Arc::clone(&self.probe), self.probe_timeout).await;
        self.evaluate(now, locked)
    }

    fn evaluate(&mut self, now: Timestamp, locked: bool) -> Option<Evaluation> {
        if locked {
            if !self.paused {
                info!("session locked, pausing scans");
                self.paused = true;
            }
            self.scheduler.set_paused(true);
            return None;
        }
        if self.paused {
            info!("session unlocked, resuming scans");
            self.paused = false;
        }
        // Also retries a scanner start that failed earlier.
        self.scheduler.set_paused(false);

        let (settings, notifications) = {
            let config = self.config.borrow();
            (config.monitor_settings(), config.notifications.clone())
        };
        self.gate.configure_notice(&notifications);

        let evaluation = self.engine.evaluate(
            now,
            self.tracker.states_mut().map(|(_, state)| state),
            &settings,
        );
        debug!(
            in_range = evaluation.in_range,
            pending = evaluation.pending,
            eligible = evaluation.eligible,
            decision = ?evaluation.decision,
            "tick"
        );

        self.fire(now, evaluation.decision, settings.auto_lock_enabled, false);
        Some(evaluation)
    }

    fn fire(
        &mut self,
        now: Timestamp,
        decision: Decision,
        auto_lock_enabled: bool,
        force: bool,
    ) -> GateOutcome {
        let outcome = self.gate.trigger(now, decision, auto_lock_enabled, force);
        match outcome {
            GateOutcome::Fired { .. } => {
                info!(forced = force, "all devices out of range, locking");
                self.tracker.clear_timers();
            }
            GateOutcome::Suppressed(SuppressReason::NoDecision) => {}
            GateOutcome::Suppressed(reason) => debug!(%reason, "lock suppressed"),
        }
        outcome
    }

    fn sync_intent(&mut self) {
        self.scheduler
            .set_monitoring(self.running && !self.tracker.is_empty());
    }
}

/// Asks the probe on a blocking worker. An error or a late answer counts as
/// not in effect.
async fn action_in_effect(probe: Arc<dyn ActionProbe>, limit: StdDuration) -> bool {
    let check = tokio::task::spawn_blocking(move || probe.is_action_in_effect());
    match tokio::time::timeout(limit, check).await {
        Ok(Ok(locked)) => locked,
        Ok(Err(e)) => {
            warn!(error = %e, "lock check failed, assuming unlocked");
            false
        }
        Err(_) => {
            warn!(
                timeout_ms = limit.as_millis(),
                "lock check timed out, assuming unlocked"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::ActuatorError;
    use crate::config::{MonitorConfig, NotificationsConfig};
    use crate::scanner::{MockScanner, ScanCommand, ScanSink};
    use crate::scheduler::ScanState;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    const PHONE: &str = "AA:BB:CC:DD:EE:01";
    const WATCH: &str = "AA:BB:CC:DD:EE:02";

    #[derive(Default)]
    struct CountingActuator(AtomicUsize);

    impl Actuator for CountingActuator {
        fn perform_action(&self) -> std::result::Result<(), ActuatorError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FlagProbe(Arc<AtomicBool>);

    impl ActionProbe for FlagProbe {
        fn is_action_in_effect(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct Fixture {
        controller: MonitorController,
        scanner: MockScanner,
        actuator: Arc<CountingActuator>,
        locked: FlagProbe,
        config: watch::Sender<Config>,
        dir: TempDir,
    }

    fn id(raw: &str) -> DeviceId {
        DeviceId::parse(raw).unwrap()
    }

    fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn fixture(stored: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = DeviceStore::new(dir.path().to_path_buf());
        let devices: Vec<MonitoredDevice> = stored
            .iter()
            .map(|raw| MonitoredDevice::new(id(raw), "Beacon"))
            .collect();
        store.save(&devices).unwrap();

        let (sink, _feed) = ScanSink::channel(16);
        let scanner = MockScanner::new(sink);
        let actuator = Arc::new(CountingActuator::default());
        let locked = FlagProbe::default();
        let (config_tx, config_rx) = watch::channel(Config {
            notifications: NotificationsConfig {
                enabled: false,
                ..NotificationsConfig::default()
            },
            ..Config::default()
        });

        let mut controller = MonitorController::new(
            MonitorParts {
                scanner: Box::new(scanner.clone()),
                actuator: actuator.clone(),
                notifier: None,
                probe: Arc::new(locked.clone()),
                store,
            },
            config_rx,
        )
        .unwrap();
        controller.handle_radio(RadioState::Ready);

        Fixture {
            controller,
            scanner,
            actuator,
            locked,
            config: config_tx,
            dir,
        }
    }

    fn seen(fx: &mut Fixture, raw: &str, rssi: i16, at: i64) {
        fx.controller
            .handle_sighting(SightingEvent::new(id(raw), rssi, t(at)));
    }

    async fn settle(fx: &mut Fixture) {
        let report = fx.controller.reports.recv().await.unwrap();
        fx.controller.handle_report(report);
    }

    #[tokio::test]
    async fn test_stale_device_locks_after_delay_and_timers_reset() {
        let mut fx = fixture(&[PHONE]);
        fx.controller.start();
        assert_eq!(fx.controller.status().scan_state, ScanState::Monitoring);

        seen(&mut fx, PHONE, -60, 0);
        for at in [0, 2, 4] {
            assert_eq!(fx.controller.tick(t(at)).await.unwrap().in_range, 1);
        }
        // Ticks every two seconds; the timer starts at t=6.
        for at in [6, 8, 10, 12, 14] {
            assert_eq!(
                fx.controller.tick(t(at)).await.unwrap().decision,
                Decision::NoAction,
                "t={at}"
            );
        }
        let evaluation = fx.controller.tick(t(16)).await.unwrap();
        assert_eq!(evaluation.decision, Decision::AllOutOfRange);

        assert!(fx
            .controller
            .monitored_devices(t(16))
            .iter()
            .all(|device| device.state.out_of_range_since.is_none()));

        settle(&mut fx).await;
        assert_eq!(fx.actuator.0.load(Ordering::SeqCst), 1);
        assert_eq!(fx.controller.status().last_triggered_at, Some(t(16)));
    }

    #[tokio::test]
    async fn test_sparse_ticks_start_timer_on_first_stale_tick() {
        let mut fx = fixture(&[PHONE]);
        fx.controller.start();
        seen(&mut fx, PHONE, -60, 0);

        let at_0 = fx.controller.tick(t(0)).await.unwrap();
        assert_eq!((at_0.in_range, at_0.decision), (1, Decision::NoAction));
        // Exactly five seconds old still counts as heard.
        let at_5 = fx.controller.tick(t(5)).await.unwrap();
        assert_eq!((at_5.in_range, at_5.decision), (1, Decision::NoAction));
        // Stale from here; the timer starts at t=11, not at the last sighting.
        let at_11 = fx.controller.tick(t(11)).await.unwrap();
        assert_eq!((at_11.pending, at_11.decision), (1, Decision::NoAction));
        assert_eq!(
            fx.controller.monitored_devices(t(11))[0].state.out_of_range_since,
            Some(t(11))
        );

        let at_20 = fx.controller.tick(t(20)).await.unwrap();
        assert_eq!(at_20.decision, Decision::NoAction);
        let at_21 = fx.controller.tick(t(21)).await.unwrap();
        assert_eq!(at_21.decision, Decision::AllOutOfRange);
        settle(&mut fx).await;
        assert_eq!(fx.controller.status().last_triggered_at, Some(t(21)));
    }

    #[tokio::test]
    async fn test_discovery_while_monitoring_keeps_devices_in_range() {
        let mut fx = fixture(&[PHONE]);
        fx.controller.start();
        fx.controller.start_discovery(t(0)).unwrap();
        assert_eq!(fx.controller.status().scan_state, ScanState::Discovering);
        assert_eq!(
            fx.scanner.last_command(),
            Some(ScanCommand::Start { continuous: true })
        );

        for at in (0..30).step_by(2) {
            seen(&mut fx, PHONE, -60, at);
            let evaluation = fx.controller.tick(t(at)).await.unwrap();
            assert_eq!(evaluation.decision, Decision::NoAction, "t={at}");
            assert_eq!(evaluation.in_range, 1, "t={at}");
        }
        assert!(fx.controller.status().last_triggered_at.is_none());
        assert_eq!(fx.actuator.0.load(Ordering::SeqCst), 0);
        assert_eq!(fx.controller.discovered_devices().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_lock_check_counts_as_unlocked() {
        struct StallingProbe;

        impl ActionProbe for StallingProbe {
            fn is_action_in_effect(&self) -> bool {
                std::thread::sleep(StdDuration::from_millis(500));
                true
            }
        }

        let mut fx = fixture(&[PHONE]);
        fx.controller.probe = Arc::new(StallingProbe);
        fx.controller.probe_timeout = StdDuration::from_millis(50);
        fx.controller.start();

        let started = std::time::Instant::now();
        assert!(fx.controller.tick(t(0)).await.is_some());
        assert!(started.elapsed() < StdDuration::from_millis(400));

        let status = fx.controller.status();
        assert!(!status.paused);
        assert_eq!(status.scan_state, ScanState::Monitoring);
    }

    #[tokio::test]
    async fn test_cooldown_between_automatic_locks() {
        let mut fx = fixture(&[PHONE]);
        fx.config.send_modify(|c| c.monitor.lock_delay_secs = 0);
        fx.controller.start();

        fx.controller.tick(t(0)).await;
        assert_eq!(
            fx.controller.tick(t(2)).await.unwrap().decision,
            Decision::AllOutOfRange
        );
        settle(&mut fx).await;

        // Timers restart after the fire, but the cooldown holds.
        for at in (4..62).step_by(2) {
            fx.controller.tick(t(at)).await;
        }
        assert_eq!(fx.actuator.0.load(Ordering::SeqCst), 1);

        fx.controller.tick(t(62)).await;
        settle(&mut fx).await;
        assert_eq!(fx.actuator.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_present_device_blocks_lock() {
        let mut fx = fixture(&[PHONE, WATCH]);
        fx.config.send_modify(|c| c.monitor.lock_delay_secs = 0);
        fx.controller.start();

        for at in (0..120).step_by(2) {
            seen(&mut fx, WATCH, -50, at);
            fx.controller.tick(t(at)).await;
        }
        assert_eq!(fx.actuator.0.load(Ordering::SeqCst), 0);
        assert!(fx.controller.status().last_triggered_at.is_none());
    }

    #[tokio::test]
    async fn test_locked_session_pauses_without_evaluating() {
        let mut fx = fixture(&[PHONE]);
        fx.controller.start();
        fx.locked.0.store(true, Ordering::SeqCst);

        assert!(fx.controller.tick(t(0)).await.is_none());
        let status = fx.controller.status();
        assert!(status.paused);
        assert_eq!(status.scan_state, ScanState::MonitoringPaused);
        assert_eq!(fx.scanner.last_command(), Some(ScanCommand::Stop));
        // Timers do not advance while paused.
        assert!(fx.controller.monitored_devices(t(0))[0]
            .state
            .out_of_range_since
            .is_none());

        fx.locked.0.store(false, Ordering::SeqCst);
        assert!(fx.controller.tick(t(2)).await.is_some());
        assert_eq!(fx.controller.status().scan_state, ScanState::Monitoring);
        assert_eq!(
            fx.scanner.last_command(),
            Some(ScanCommand::Start { continuous: true })
        );
    }

    #[tokio::test]
    async fn test_stop_clears_timers_and_intent() {
        let mut fx = fixture(&[PHONE]);
        fx.controller.start();
        fx.controller.tick(t(0)).await;
        assert!(fx.controller.monitored_devices(t(0))[0]
            .state
            .out_of_range_since
            .is_some());

        let status = fx.controller.stop();
        assert!(!status.running);
        assert_eq!(status.scan_state, ScanState::Idle);
        assert!(fx.controller.monitored_devices(t(0))[0]
            .state
            .out_of_range_since
            .is_none());
        assert!(fx.controller.tick(t(2)).await.is_none());
    }

    #[tokio::test]
    async fn test_test_action_is_forced() {
        let mut fx = fixture(&[PHONE]);
        fx.config.send_modify(|c| c.monitor.lock_delay_secs = 0);
        fx.controller.start();
        fx.controller.tick(t(0)).await;
        assert!(fx.controller.tick(t(2)).await.is_some());
        settle(&mut fx).await;

        // Five seconds after an automatic lock: forced fires, automatic does not.
        let outcome = fx.controller.test_action(t(7));
        assert!(outcome.fired);
        settle(&mut fx).await;
        fx.controller.tick(t(8)).await;
        fx.controller.tick(t(10)).await;
        assert!(!fx.controller.status().action_in_flight);
        assert_eq!(fx.actuator.0.load(Ordering::SeqCst), 2);

        fx.config.send_modify(|c| c.monitor.auto_lock_enabled = false);
        let outcome = fx.controller.test_action(t(20));
        assert!(!outcome.fired);
        assert_eq!(outcome.reason.as_deref(), Some("auto-lock is disabled"));
    }

    #[tokio::test]
    async fn test_discovery_and_toggle_persist() {
        let mut fx = fixture(&[]);
        fx.controller.start();
        assert_eq!(fx.controller.status().scan_state, ScanState::Idle);

        fx.controller.start_discovery(t(0)).unwrap();
        fx.controller.handle_sighting(
            SightingEvent::new(id(PHONE), -55, t(1)).with_name("Sam's iPhone"),
        );
        seen(&mut fx, WATCH, -80, 1);
        let discovered = fx.controller.discovered_devices();
        assert_eq!(discovered.len(), 2);
        assert_eq!(discovered[0].id, id(PHONE));

        let outcome = fx.controller.toggle_monitoring(&id(PHONE)).unwrap();
        assert!(outcome.is_monitored);
        assert!(fx.controller.discovered_devices()[0].is_monitored);

        let store = DeviceStore::new(fx.dir.path().to_path_buf());
        assert_eq!(store.load().unwrap(), vec![outcome.device.clone()]);

        // Discovery wins over monitoring until the window closes.
        assert_eq!(fx.controller.status().scan_state, ScanState::Discovering);
        fx.controller.tick(t(30)).await;
        assert_eq!(fx.controller.status().scan_state, ScanState::Monitoring);

        let outcome = fx.controller.toggle_monitoring(&id(PHONE)).unwrap();
        assert!(!outcome.is_monitored);
        assert!(store.load().unwrap().is_empty());
        assert_eq!(fx.controller.status().scan_state, ScanState::Idle);
    }

    #[tokio::test]
    async fn test_first_toggled_device_starts_monitoring() {
        let mut fx = fixture(&[]);
        assert!(!fx.controller.status().running);

        fx.controller.start_discovery(t(0)).unwrap();
        seen(&mut fx, PHONE, -55, 1);
        fx.controller.toggle_monitoring(&id(PHONE)).unwrap();

        let status = fx.controller.status();
        assert!(status.running);
        assert_eq!(status.monitored_count, 1);
        assert_eq!(status.scan_state, ScanState::Discovering);
        assert_eq!(
            fx.scanner.last_command(),
            Some(ScanCommand::Start { continuous: true })
        );

        fx.controller.stop_discovery();
        assert_eq!(fx.controller.status().scan_state, ScanState::Monitoring);
        assert!(fx.controller.tick(t(2)).await.is_some());
    }

    #[tokio::test]
    async fn test_removing_last_device_stops_monitoring() {
        let mut fx = fixture(&[PHONE, WATCH]);
        fx.controller.start();
        fx.controller.tick(t(0)).await;

        fx.controller.toggle_monitoring(&id(WATCH)).unwrap();
        assert!(fx.controller.status().running);
        assert_eq!(fx.controller.status().scan_state, ScanState::Monitoring);

        fx.controller.toggle_monitoring(&id(PHONE)).unwrap();
        let status = fx.controller.status();
        assert!(!status.running);
        assert_eq!(status.monitored_count, 0);
        assert_eq!(status.scan_state, ScanState::Idle);
        assert_eq!(fx.scanner.last_command(), Some(ScanCommand::Stop));
        assert!(fx.controller.tick(t(2)).await.is_none());
    }

    #[tokio::test]
    async fn test_toggle_unknown_device() {
        let mut fx = fixture(&[]);
        assert!(matches!(
            fx.controller.toggle_monitoring(&id(PHONE)),
            Err(UmbraError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_radio_loss_suspends_monitoring() {
        let mut fx = fixture(&[PHONE]);
        fx.controller.start();
        fx.controller.handle_radio(RadioState::PoweredOff);
        assert_eq!(fx.controller.status().scan_state, ScanState::Suspended);
        assert!(matches!(
            fx.controller.start_discovery(t(0)),
            Err(UmbraError::RadioUnavailable(RadioState::PoweredOff))
        ));

        fx.controller.handle_radio(RadioState::Ready);
        assert_eq!(fx.controller.status().scan_state, ScanState::Monitoring);
    }

    #[tokio::test]
    async fn test_spawned_monitor_starts_on_launch() {
        let dir = TempDir::new().unwrap();
        let store = DeviceStore::new(dir.path().to_path_buf());
        store
            .save(&[MonitoredDevice::new(id(PHONE), "Phone")])
            .unwrap();

        let (sink, feed) = ScanSink::channel(16);
        let scanner = MockScanner::new(sink);
        let (_config_tx, config_rx) = watch::channel(Config {
            monitor: MonitorConfig {
                start_on_launch: true,
                ..MonitorConfig::default()
            },
            ..Config::default()
        });
        let controller = MonitorController::new(
            MonitorParts {
                scanner: Box::new(scanner.clone()),
                actuator: Arc::new(CountingActuator::default()),
                notifier: None,
                probe: Arc::new(FlagProbe::default()),
                store,
            },
            config_rx,
        )
        .unwrap();

        let shutdown = CancellationToken::new();
        let (handle, task) = controller.spawn(feed, shutdown.clone());

        let status = handle.status().await.unwrap();
        assert!(status.running);
        assert_eq!(status.radio, RadioState::Ready);
        assert_eq!(status.scan_state, ScanState::Monitoring);

        scanner.emit(SightingEvent::new(id(PHONE), -50, Utc::now()));
        let devices = loop {
            let devices = handle.monitored_devices().await.unwrap();
            if devices[0].state.last_rssi.is_some() {
                break devices;
            }
            tokio::task::yield_now().await;
        };
        assert!(devices[0].in_range);

        let stopped = handle.stop().await.unwrap();
        assert!(!stopped.running);

        shutdown.cancel();
        task.await.unwrap();
        assert!(handle.status().await.is_err());
        assert_eq!(scanner.last_command(), Some(ScanCommand::Stop));
    }
}
