use std::{
    collections::VecDeque,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use blewatch_domain::{
    clock::Timestamp,
    monitor::VehicleMonitor,
    report::SensorReport,
    sink::ChannelReading,
    vehicle_state::{ConnectivityState, VehicleState},
};

const RECENT_REPORTS: usize = 50;

/// What displays get to see of the agent, refreshed after every event.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub vehicle: String,
    pub state: VehicleState,
    pub connectivity: ConnectivityState,
    pub readings: Vec<ChannelReading>,
    pub time_disconnected: Option<Duration>,
    pub next_poll_in: Option<Duration>,
    /// Newest last.
    pub recent: VecDeque<SensorReport>,
}

impl Snapshot {
    pub(crate) fn refresh(&mut self, monitor: &VehicleMonitor, now: Timestamp) {
        self.vehicle = monitor.identity().to_string();
        self.state = monitor.state(now);
        self.connectivity = monitor.connectivity();
        self.readings = monitor.sink().readings(now);
        self.time_disconnected = monitor.time_disconnected(now);
        self.next_poll_in = monitor
            .next_poll_at()
            .map(|at| at.saturating_duration_since(now));
    }

    pub(crate) fn record(&mut self, reports: &[SensorReport]) {
        self.recent.extend(reports.iter().cloned());
        while self.recent.len() > RECENT_REPORTS {
            self.recent.pop_front();
        }
    }

    pub fn known_count(&self) -> usize {
        self.readings.iter().filter(|r| r.value.is_some()).count()
    }
}

/// Shared between the agent task and whoever displays it.
#[derive(Debug, Clone, Default)]
pub struct SharedSnapshot(Arc<RwLock<Snapshot>>);

impl SharedSnapshot {
    pub fn read(&self) -> Snapshot {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut Snapshot)) {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }
}
