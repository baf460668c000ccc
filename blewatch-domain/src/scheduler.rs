use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    params::PollingParameters,
    vehicle_state::{ConnectivityState, VehicleState},
};

/// Delay between reconnection attempts, before clamping to the base interval.
pub const RECONNECT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// A group of telemetry that can be requested in one go.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestCategory {
    /// Security-domain status: sleep, lock, presence, closures. Safe while asleep.
    VehicleStatus,
    ChargeState,
    ClimateState,
    DriveState,
    ClosuresState,
}

impl RequestCategory {
    /// Infotainment requests wake a sleeping vehicle.
    pub fn wakes_vehicle(&self) -> bool {
        !matches!(self, RequestCategory::VehicleStatus)
    }

    pub fn key(&self) -> &'static str {
        use RequestCategory::*;
        match self {
            VehicleStatus => "vehicle_status",
            ChargeState => "charge_state",
            ClimateState => "climate_state",
            DriveState => "drive_state",
            ClosuresState => "closures_state",
        }
    }
}

impl std::fmt::Display for RequestCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

const FULL_PLAN: [RequestCategory; 5] = [
    RequestCategory::VehicleStatus,
    RequestCategory::ChargeState,
    RequestCategory::ClimateState,
    RequestCategory::DriveState,
    RequestCategory::ClosuresState,
];

/// Pure polling policy over the validated [`PollingParameters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingScheduler {
    params: PollingParameters,
}

impl PollingScheduler {
    #[must_use]
    pub fn new(params: PollingParameters) -> PollingScheduler {
        PollingScheduler { params }
    }

    pub fn params(&self) -> &PollingParameters {
        &self.params
    }

    /// How long to wait before the next poll (or reconnect attempt).
    ///
    /// Never shorter than the base interval.
    pub fn next_poll_delay(
        &self,
        state: VehicleState,
        connectivity: ConnectivityState,
        time_since_wake_request: Option<Duration>,
    ) -> Duration {
        let p = &self.params;
        let in_wake_window =
            time_since_wake_request.is_some_and(|elapsed| elapsed < p.post_wake_poll_time());

        let delay = if connectivity != ConnectivityState::Connected {
            RECONNECT_RETRY_DELAY
        } else if state == VehicleState::Waking && in_wake_window {
            p.poll_data_period().min(p.poll_charging_period())
        } else {
            match state {
                VehicleState::Charging => p.poll_charging_period(),
                VehicleState::Asleep => p.poll_asleep_period(),
                VehicleState::Awake | VehicleState::Unknown | VehicleState::Waking => {
                    p.poll_data_period()
                }
            }
        };
        delay.max(p.base_interval())
    }

    /// [`next_poll_delay`](Self::next_poll_delay), except that a connected, awake vehicle
    /// in use polls at the charging cadence.
    pub fn next_poll_delay_in_use(
        &self,
        state: VehicleState,
        connectivity: ConnectivityState,
        time_since_wake_request: Option<Duration>,
        in_use: bool,
    ) -> Duration {
        let delay = self.next_poll_delay(state, connectivity, time_since_wake_request);
        if in_use && state == VehicleState::Awake && connectivity == ConnectivityState::Connected {
            delay.min(self.params.poll_charging_period().max(self.params.base_interval()))
        } else {
            delay
        }
    }

    /// Which categories to request for a poll in `state`.
    pub fn poll_plan(&self, state: VehicleState) -> Vec<RequestCategory> {
        match state {
            VehicleState::Asleep | VehicleState::Unknown => vec![RequestCategory::VehicleStatus],
            VehicleState::Awake | VehicleState::Charging | VehicleState::Waking => {
                FULL_PLAN.to_vec()
            }
        }
    }

    /// Everything, regardless of state. Used for explicit refresh requests.
    pub fn full_plan(&self) -> Vec<RequestCategory> {
        FULL_PLAN.to_vec()
    }
}
