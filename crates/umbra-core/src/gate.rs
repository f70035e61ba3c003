//! Cooldown and single-flight discipline around the [`Actuator`].
//!
//! The gate decides synchronously whether an action may fire. Firing hands
//! the work to a background task: optional notification, a short notice
//! delay, then the actuator, both on blocking workers. The task always reports
//! back through an [`ActionReport`], which the owner feeds to
//! [`ActionGate::complete`].

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::actuator::{Actuator, Notifier};
use crate::config::NotificationsConfig;
use crate::debounce::Decision;
use crate::types::Timestamp;

/// Non-forced actions never fire more often than this.
pub const MINIMUM_INTERVAL_SECS: i64 = 60;

/// Why a trigger did not fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// The engine did not ask for an action.
    NoDecision,
    /// Auto-lock is switched off.
    AutoLockDisabled,
    /// The previous action was too recent.
    CoolingDown {
        /// Time left until a non-forced action may fire.
        remaining: Duration,
    },
    /// An earlier dispatch has not reported back yet.
    ActionInFlight,
}

impl std::fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDecision => f.write_str("no action requested"),
            Self::AutoLockDisabled => f.write_str("auto-lock is disabled"),
            Self::CoolingDown { remaining } => {
                write!(f, "cooling down, {}s remaining", remaining.num_seconds())
            }
            Self::ActionInFlight => f.write_str("previous action still in progress"),
        }
    }
}

/// Result of [`ActionGate::trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// The action was dispatched.
    Fired {
        /// Correlates the eventual [`ActionReport`].
        action_id: Uuid,
    },
    /// Nothing was dispatched.
    Suppressed(SuppressReason),
}

impl GateOutcome {
    /// Whether the action was dispatched.
    #[must_use]
    pub const fn fired(&self) -> bool {
        matches!(self, Self::Fired { .. })
    }
}

/// How a dispatched action ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The actuator succeeded.
    Completed,
    /// The actuator failed.
    Failed(String),
    /// Cancelled before the actuator was called.
    Cancelled,
}

/// Completion notice for one dispatched action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ActionReport {
    /// Id returned by [`GateOutcome::Fired`].
    pub action_id: Uuid,
    /// Whether the trigger bypassed the cooldown.
    pub forced: bool,
    /// How it ended.
    pub outcome: ActionOutcome,
    /// When the task finished.
    #[schema(value_type = String, format = DateTime)]
    pub finished_at: Timestamp,
}

/// Wraps the actuator with a cooldown and at most one dispatch in flight.
pub struct ActionGate {
    actuator: Arc<dyn Actuator>,
    notifier: Option<Arc<dyn Notifier>>,
    notify: bool,
    notice_delay: StdDuration,
    minimum_interval: Duration,
    last_triggered_at: Option<Timestamp>,
    in_flight: Option<Uuid>,
    reports: mpsc::UnboundedSender<ActionReport>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ActionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionGate")
            .field("notice_delay", &self.notice_delay)
            .field("last_triggered_at", &self.last_triggered_at)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl ActionGate {
    /// Creates a gate. Completion reports are sent to `reports`.
    #[must_use]
    pub fn new(actuator: Arc<dyn Actuator>, reports: mpsc::UnboundedSender<ActionReport>) -> Self {
        Self {
            actuator,
            notifier: None,
            notify: true,
            notice_delay: StdDuration::ZERO,
            minimum_interval: Duration::seconds(MINIMUM_INTERVAL_SECS),
            last_triggered_at: None,
            in_flight: None,
            reports,
            cancel: CancellationToken::new(),
        }
    }

    /// Announces each action through `notifier` before performing it.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sets the pause between the notification and the action.
    pub fn set_notice_delay(&mut self, delay: StdDuration) {
        self.notice_delay = delay;
    }

    /// Applies the notification settings to later dispatches.
    pub fn configure_notice(&mut self, notifications: &NotificationsConfig) {
        self.notify = notifications.enabled;
        self.notice_delay = notifications.notice_delay();
    }

    /// When the last action fired.
    #[must_use]
    pub const fn last_triggered_at(&self) -> Option<Timestamp> {
        self.last_triggered_at
    }

    /// Whether a dispatch has not reported back yet.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Fires the action if the decision, the switch and the cooldown allow it.
    ///
    /// `force` bypasses only the cooldown. On fire `last_triggered_at` is
    /// set to `now`, forced or not; the caller is expected to clear the
    /// debounce timers.
    pub fn trigger(
        &mut self,
        now: Timestamp,
        decision: Decision,
        auto_lock_enabled: bool,
        force: bool,
    ) -> GateOutcome {
        if decision != Decision::AllOutOfRange {
            return GateOutcome::Suppressed(SuppressReason::NoDecision);
        }
        if !auto_lock_enabled {
            return GateOutcome::Suppressed(SuppressReason::AutoLockDisabled);
        }
        if self.in_flight.is_some() {
            return GateOutcome::Suppressed(SuppressReason::ActionInFlight);
        }
        if !force {
            if let Some(last) = self.last_triggered_at {
                let elapsed = now - last;
                if elapsed < self.minimum_interval {
                    return GateOutcome::Suppressed(SuppressReason::CoolingDown {
                        remaining: self.minimum_interval - elapsed,
                    });
                }
            }
        }

        let action_id = Uuid::now_v7();
        self.last_triggered_at = Some(now);
        self.in_flight = Some(action_id);
        info!(%action_id, forced = force, "dispatching lock action");
        self.dispatch(action_id, force);
        GateOutcome::Fired { action_id }
    }

    /// Marks the dispatch behind `report` as finished.
    pub fn complete(&mut self, report: &ActionReport) {
        if self.in_flight == Some(report.action_id) {
            self.in_flight = None;
        }
        match &report.outcome {
            ActionOutcome::Completed => info!(action_id = %report.action_id, "lock action completed"),
            ActionOutcome::Failed(message) => {
                error!(action_id = %report.action_id, error = %message, "lock action failed");
            }
            ActionOutcome::Cancelled => {
                debug!(action_id = %report.action_id, "lock action cancelled");
            }
        }
    }

    /// Cancels a dispatch that is still waiting out its notice delay.
    ///
    /// An actuator call that already started runs to completion.
    pub fn cancel_pending(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
    }

    fn dispatch(&self, action_id: Uuid, forced: bool) {
        let actuator = Arc::clone(&self.actuator);
        let notifier = self.notifier.clone().filter(|_| self.notify);
        let delay = self.notice_delay;
        let cancel = self.cancel.clone();
        let reports = self.reports.clone();

        tokio::spawn(async move {
            if let Some(notifier) = notifier {
                if let Err(e) =
                    tokio::task::spawn_blocking(move || notifier.notify_before_action()).await
                {
                    debug!(error = %e, "notifier task failed");
                }
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => ActionOutcome::Cancelled,
                () = tokio::time::sleep(delay) => {
                    match tokio::task::spawn_blocking(move || actuator.perform_action()).await {
                        Ok(Ok(())) => ActionOutcome::Completed,
                        Ok(Err(e)) => ActionOutcome::Failed(e.to_string()),
                        Err(e) => ActionOutcome::Failed(format!("actuator task panicked: {e}")),
                    }
                }
            };

            let _ = reports.send(ActionReport {
                action_id,
                forced,
                outcome,
                finished_at: chrono::Utc::now(),
            });
        });
    }
}
