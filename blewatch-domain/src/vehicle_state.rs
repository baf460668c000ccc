use std::{collections::BTreeSet, time::Duration};

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    clock::Timestamp,
    telemetry::{ChargingState, TelemetryEvent},
};

/// Coarse vehicle state inferred from decoded telemetry.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum VehicleState {
    #[default]
    Unknown,
    Awake,
    Asleep,
    Charging,
    Waking,
}

impl std::fmt::Display for VehicleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            VehicleState::Unknown => "unknown",
            VehicleState::Awake => "awake",
            VehicleState::Asleep => "asleep",
            VehicleState::Charging => "charging",
            VehicleState::Waking => "waking",
        };
        write!(f, "{label}")
    }
}

/// Link state as reported by the transport.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectivityState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectivityState::Disconnected => "disconnected",
            ConnectivityState::Connecting => "connecting",
            ConnectivityState::Connected => "connected",
        };
        write!(f, "{label}")
    }
}

/// Which decoded charging substates count as actively charging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargingPredicate {
    active: BTreeSet<ChargingState>,
}

impl ChargingPredicate {
    pub fn new(active: impl IntoIterator<Item = ChargingState>) -> ChargingPredicate {
        ChargingPredicate {
            active: active.into_iter().collect(),
        }
    }

    pub fn is_charging(&self, state: ChargingState) -> bool {
        self.active.contains(&state)
    }
}

impl Default for ChargingPredicate {
    fn default() -> Self {
        ChargingPredicate::new([ChargingState::Starting, ChargingState::Charging])
    }
}

/// Derives [`VehicleState`] from the latest decoded sleep flag and charging substate.
///
/// A wake request opens a window of `post_wake_poll_time` during which the reported
/// state is [`VehicleState::Waking`] whatever the vehicle confirms; once the window
/// closes the last confirmed state shows through again.
#[derive(Debug, Clone)]
pub struct VehicleStateTracker {
    predicate: ChargingPredicate,
    post_wake_poll_time: Duration,
    confirmed: VehicleState,
    asleep: Option<bool>,
    charging: Option<ChargingState>,
    unlocked: Option<bool>,
    wake_requested_at: Option<Timestamp>,
}

impl VehicleStateTracker {
    pub fn new(predicate: ChargingPredicate, post_wake_poll_time: Duration) -> VehicleStateTracker {
        VehicleStateTracker {
            predicate,
            post_wake_poll_time,
            confirmed: VehicleState::Unknown,
            asleep: None,
            charging: None,
            unlocked: None,
            wake_requested_at: None,
        }
    }

    /// Applies one decoded attribute update. Returns true if the confirmed state changed.
    pub fn on_telemetry_event(&mut self, event: &TelemetryEvent) -> bool {
        if let Some(asleep) = event.is_asleep() {
            self.asleep = Some(asleep);
        }
        if let Some(charging) = event.charging_state() {
            self.charging = Some(charging);
        }
        if let Some(unlocked) = event.is_unlocked() {
            self.unlocked = Some(unlocked);
        }

        let next = if self.asleep == Some(true) {
            VehicleState::Asleep
        } else if self
            .charging
            .is_some_and(|state| self.predicate.is_charging(state))
        {
            VehicleState::Charging
        } else {
            VehicleState::Awake
        };

        if next == self.confirmed {
            return false;
        }
        info!("vehicle state {} -> {}", self.confirmed, next);
        self.confirmed = next;
        true
    }

    /// Starts the wake window if the vehicle is known to be asleep.
    pub fn on_wake_requested(&mut self, now: Timestamp) -> bool {
        if self.confirmed != VehicleState::Asleep {
            debug!("wake requested while {}, no transition", self.confirmed);
            return false;
        }
        info!("vehicle state asleep -> waking");
        self.wake_requested_at = Some(now);
        true
    }

    pub fn on_disconnect_timeout(&mut self) {
        if self.confirmed != VehicleState::Unknown {
            info!("vehicle state {} -> unknown (disconnect timeout)", self.confirmed);
        }
        self.confirmed = VehicleState::Unknown;
        self.asleep = None;
        self.charging = None;
        self.unlocked = None;
        self.wake_requested_at = None;
    }

    pub fn state(&self, now: Timestamp) -> VehicleState {
        if self.in_wake_window(now) {
            VehicleState::Waking
        } else {
            self.confirmed
        }
    }

    /// Awake with the doors unlocked: someone is probably using the car.
    pub fn in_use(&self) -> bool {
        self.confirmed == VehicleState::Awake && self.unlocked == Some(true)
    }

    pub fn confirmed_state(&self) -> VehicleState {
        self.confirmed
    }

    pub fn time_since_wake_request(&self, now: Timestamp) -> Option<Duration> {
        self.wake_requested_at
            .map(|at| now.saturating_duration_since(at))
    }

    fn in_wake_window(&self, now: Timestamp) -> bool {
        self.time_since_wake_request(now)
            .is_some_and(|elapsed| elapsed < self.post_wake_poll_time)
    }
}
