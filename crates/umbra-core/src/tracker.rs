//! Per-device proximity state.
//!
//! [`ProximityTracker`] owns one [`DeviceState`] per monitored device. It only
//! records what the radio reported; deciding whether a device is in range is
//! the [`DebounceEngine`](crate::debounce::DebounceEngine)'s job.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::device::SignalStrength;
use crate::types::{DeviceId, SightingEvent, Timestamp};

/// What the engine knows about one monitored device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeviceState {
    /// Time of the most recent sighting.
    #[schema(value_type = Option<String>, format = DateTime)]
    pub last_seen_at: Option<Timestamp>,

    /// Signal strength of the most recent sighting, in dBm.
    #[schema(example = -62)]
    pub last_rssi: Option<i16>,

    /// Set while the device fails the in-range test.
    #[schema(value_type = Option<String>, format = DateTime)]
    pub out_of_range_since: Option<Timestamp>,
}

impl DeviceState {
    /// Bucketed strength of the last reading.
    #[must_use]
    pub fn signal_strength(&self) -> Option<SignalStrength> {
        self.last_rssi.map(SignalStrength::from_rssi)
    }
}

/// Mapping from monitored device id to [`DeviceState`].
#[derive(Debug, Default)]
pub struct ProximityTracker {
    monitored: HashSet<DeviceId>,
    states: HashMap<DeviceId, DeviceState>,
}

impl ProximityTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the monitored set, dropping state for devices no longer in it.
    pub fn set_monitored<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = DeviceId>,
    {
        self.monitored = ids.into_iter().collect();
        let monitored = &self.monitored;
        self.states.retain(|id, _| monitored.contains(id));
    }

    /// Starts tracking `id`. Returns `false` if it was already tracked.
    pub fn add(&mut self, id: DeviceId) -> bool {
        self.monitored.insert(id)
    }

    /// Stops tracking `id` and forgets its state.
    pub fn remove(&mut self, id: &DeviceId) -> bool {
        self.states.remove(id);
        self.monitored.remove(id)
    }

    /// Whether `id` is monitored.
    #[must_use]
    pub fn is_monitored(&self, id: &DeviceId) -> bool {
        self.monitored.contains(id)
    }

    /// Number of monitored devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.monitored.len()
    }

    /// Whether nothing is monitored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.monitored.is_empty()
    }

    /// Records a sighting of a monitored device; other devices are ignored.
    ///
    /// `out_of_range_since` is left alone: a device only regains "in range"
    /// through the same evaluation that revoked it.
    pub fn observe(&mut self, event: &SightingEvent) -> bool {
        if !self.monitored.contains(&event.device_id) {
            return false;
        }

        let state = self.states.entry(event.device_id.clone()).or_default();
        // Late deliveries must not move the clock backwards.
        if state.last_seen_at.map_or(true, |seen| event.observed_at >= seen) {
            state.last_seen_at = Some(event.observed_at);
            state.last_rssi = Some(event.rssi);
        }
        true
    }

    /// Copy of every monitored device's state.
    ///
    /// Devices never seen and never evaluated report the default state.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<DeviceId, DeviceState> {
        self.monitored
            .iter()
            .map(|id| (id.clone(), self.state(id).unwrap_or_default()))
            .collect()
    }

    /// State of one device, if it is monitored and has been touched.
    #[must_use]
    pub fn state(&self, id: &DeviceId) -> Option<DeviceState> {
        self.states.get(id).copied()
    }

    /// Mutable state for every monitored device, creating entries lazily.
    pub(crate) fn states_mut(&mut self) -> impl Iterator<Item = (&DeviceId, &mut DeviceState)> {
        for id in &self.monitored {
            if !self.states.contains_key(id) {
                self.states.insert(id.clone(), DeviceState::default());
            }
        }
        self.states.iter_mut()
    }

    /// Clears every debounce timer so the next window starts fresh.
    pub fn clear_timers(&mut self) {
        for state in self.states.values_mut() {
            state.out_of_range_since = None;
        }
    }
}
