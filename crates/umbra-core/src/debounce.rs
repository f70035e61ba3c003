//! The debounced proximity rule.
//!
//! A device is *in range* when its last reading is fresh and strong enough.
//! Once it drops out, it has to stay out for the whole lock delay before it
//! counts towards locking, and the lock only triggers when **every**
//! monitored device has crossed that bar.
//!
//! ```text
//!  in range ──(stale or weak)──▶ timer started ──(delay elapsed)──▶ eligible
//!     ▲                                 │                              │
//!     └──────────(fresh + strong)───────┴──────────────────────────────┘
//! ```

use chrono::Duration;

use crate::config::MonitorSettings;
use crate::tracker::DeviceState;
use crate::types::Timestamp;

/// A reading older than this never counts as "currently in range".
pub const STALENESS_WINDOW_SECS: i64 = 5;

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// At least one device is present, still debouncing, or nothing is monitored.
    NoAction,
    /// Every monitored device has been out of range for the full delay.
    AllOutOfRange,
}

/// Decision plus per-device tallies for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    /// The aggregate decision.
    pub decision: Decision,
    /// Devices currently in range.
    pub in_range: usize,
    /// Out-of-range devices still inside their delay.
    pub pending: usize,
    /// Out-of-range devices past their delay.
    pub eligible: usize,
}

impl Evaluation {
    /// Number of devices evaluated.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.in_range + self.pending + self.eligible
    }
}

/// Stateless evaluator of the all-devices-out-of-range rule.
#[derive(Debug, Clone, Copy)]
pub struct DebounceEngine {
    staleness: Duration,
}

impl Default for DebounceEngine {
    fn default() -> Self {
        Self {
            staleness: Duration::seconds(STALENESS_WINDOW_SECS),
        }
    }
}

impl DebounceEngine {
    /// Creates an engine with the standard staleness window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `state` counts as in range at `now`.
    #[must_use]
    pub fn is_in_range(&self, now: Timestamp, state: &DeviceState, settings: &MonitorSettings) -> bool {
        match (state.last_seen_at, state.last_rssi) {
            (Some(seen), Some(rssi)) => {
                now - seen <= self.staleness && rssi >= settings.rssi_threshold
            }
            _ => false,
        }
    }

    /// Runs one tick of the rule over every monitored device's state.
    ///
    /// Updates each device's `out_of_range_since`: cleared when in range,
    /// started at `now` on the first failing tick. A device whose timer
    /// starts on this tick is never eligible on this tick.
    pub fn evaluate<'a, I>(&self, now: Timestamp, states: I, settings: &MonitorSettings) -> Evaluation
    where
        I: IntoIterator<Item = &'a mut DeviceState>,
    {
        let mut evaluation = Evaluation {
            decision: Decision::NoAction,
            in_range: 0,
            pending: 0,
            eligible: 0,
        };

        for state in states {
            if self.is_in_range(now, state, settings) {
                state.out_of_range_since = None;
                evaluation.in_range += 1;
                continue;
            }

            match state.out_of_range_since {
                None => {
                    state.out_of_range_since = Some(now);
                    evaluation.pending += 1;
                }
                Some(since) if now - since >= settings.lock_delay => evaluation.eligible += 1,
                Some(_) => evaluation.pending += 1,
            }
        }

        if evaluation.eligible > 0 && evaluation.eligible == evaluation.total() {
            evaluation.decision = Decision::AllOutOfRange;
        }
        evaluation
    }
}
