use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::{
    clock::Timestamp,
    identity::VehicleIdentity,
    params::PollingParameters,
    scheduler::{PollingScheduler, RequestCategory},
    sink::{Notification, TelemetrySink},
    staleness::StalenessMonitor,
    telemetry::TelemetryEvent,
    vehicle_state::{ChargingPredicate, ConnectivityState, VehicleState, VehicleStateTracker},
};

/// Connection counter. Responses are tagged with the episode they were received in.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Episode(u64);

impl Episode {
    fn next(self) -> Episode {
        Episode(self.0 + 1)
    }

    /// True until the first connection.
    pub fn is_initial(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Episode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something the transport has to do on the monitor's behalf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Connect,
    Poll(Vec<RequestCategory>),
    Wake,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tick {
    pub notifications: Vec<Notification>,
    pub actions: Vec<Action>,
}

impl Tick {
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty() && self.actions.is_empty()
    }
}

/// Ties the tracker, scheduler, staleness monitor and sink together for one vehicle.
///
/// Synchronous and clock-free: every entry point takes `now`, and whatever the
/// transport must do comes back as [`Action`]s.
#[derive(Debug)]
pub struct VehicleMonitor {
    identity: VehicleIdentity,
    tracker: VehicleStateTracker,
    scheduler: PollingScheduler,
    staleness: StalenessMonitor,
    sink: TelemetrySink,
    connectivity: ConnectivityState,
    episode: Episode,
    next_connect_at: Timestamp,
    next_poll_at: Option<Timestamp>,
    pending_wake: bool,
    force_full: bool,
}

impl VehicleMonitor {
    pub fn new(
        identity: VehicleIdentity,
        params: PollingParameters,
        predicate: ChargingPredicate,
        sink: TelemetrySink,
    ) -> VehicleMonitor {
        VehicleMonitor {
            identity,
            tracker: VehicleStateTracker::new(predicate, params.post_wake_poll_time()),
            scheduler: PollingScheduler::new(params),
            staleness: StalenessMonitor::new(params.ble_disconnected_min_time()),
            sink,
            connectivity: ConnectivityState::Disconnected,
            episode: Episode::default(),
            next_connect_at: Timestamp::ZERO,
            next_poll_at: None,
            pending_wake: false,
            force_full: false,
        }
    }

    pub fn on_connecting(&mut self) {
        debug!("connecting to {}", self.identity);
        self.connectivity = ConnectivityState::Connecting;
    }

    /// Starts a new episode and polls straight away.
    pub fn on_connected(&mut self, now: Timestamp) -> Episode {
        self.episode = self.episode.next();
        info!("connected to {} (episode {})", self.identity, self.episode);
        self.connectivity = ConnectivityState::Connected;
        self.staleness.on_connected(now);
        self.next_poll_at = Some(now);
        self.episode
    }

    pub fn on_disconnected(&mut self, now: Timestamp) {
        if self.connectivity == ConnectivityState::Connected {
            info!("disconnected from {} (episode {})", self.identity, self.episode);
        }
        self.connectivity = ConnectivityState::Disconnected;
        self.staleness.on_disconnected(now);
        self.next_poll_at = None;
        self.next_connect_at = now + self.reconnect_delay(now);
    }

    pub fn on_transport_failure(&mut self, now: Timestamp) {
        warn!("transport failure while {}", self.connectivity);
        self.on_disconnected(now);
    }

    /// Applies a decoded response. Responses from before the first connection, or from an
    /// old or timed-out episode, change nothing.
    pub fn on_response(
        &mut self,
        episode: Episode,
        events: &[TelemetryEvent],
        now: Timestamp,
    ) -> Vec<Notification> {
        if episode.is_initial() || episode != self.episode || self.staleness.is_applied() {
            trace!(
                "discarding {} events from episode {} (current {})",
                events.len(),
                episode,
                self.episode
            );
            return vec![];
        }

        let before = self.tracker.confirmed_state();
        let mut notifications = vec![];
        for event in events {
            self.tracker.on_telemetry_event(event);
            notifications.extend(self.sink.update(event.attribute, event.value.clone(), now));
        }
        let after = self.tracker.confirmed_state();

        // a wake request already polled everything
        let woke_up = matches!(before, VehicleState::Asleep | VehicleState::Unknown)
            && matches!(after, VehicleState::Awake | VehicleState::Charging)
            && self.tracker.state(now) != VehicleState::Waking;
        if woke_up && self.connectivity == ConnectivityState::Connected {
            debug!("vehicle now {after}, polling everything now");
            self.next_poll_at = Some(now);
        }
        notifications
    }

    /// Periodic driver. Staleness is evaluated before anything is scheduled.
    pub fn on_tick(&mut self, now: Timestamp) -> Tick {
        let mut tick = Tick::default();

        if let Some(notifications) = self.staleness.on_tick(now, &mut self.sink) {
            self.tracker.on_disconnect_timeout();
            tick.notifications = notifications;
        }

        match self.connectivity {
            ConnectivityState::Disconnected => {
                if now >= self.next_connect_at {
                    self.next_connect_at = now + self.reconnect_delay(now);
                    tick.actions.push(Action::Connect);
                }
            }
            ConnectivityState::Connecting => {}
            ConnectivityState::Connected => {
                if self.pending_wake {
                    self.pending_wake = false;
                    tick.actions.extend(self.wake_now(now));
                } else if self.next_poll_at.is_some_and(|at| now >= at) {
                    tick.actions.push(self.poll_now(now));
                }
            }
        }
        tick
    }

    /// Sends a wake followed by a poll, or remembers the request until the next connection.
    pub fn request_wake(&mut self, now: Timestamp) -> Vec<Action> {
        if self.connectivity != ConnectivityState::Connected {
            info!("wake requested while {}, deferring", self.connectivity);
            self.pending_wake = true;
            return vec![];
        }
        self.wake_now(now)
    }

    /// Polls every category on the next tick, without sending a wake.
    pub fn force_update(&mut self, now: Timestamp) {
        debug!("forced update requested");
        self.force_full = true;
        if self.connectivity == ConnectivityState::Connected {
            self.next_poll_at = Some(now);
        }
    }

    fn wake_now(&mut self, now: Timestamp) -> Vec<Action> {
        self.tracker.on_wake_requested(now);
        vec![Action::Wake, self.poll_now(now)]
    }

    fn poll_now(&mut self, now: Timestamp) -> Action {
        let state = self.tracker.state(now);
        let plan = if self.force_full {
            self.force_full = false;
            self.scheduler.full_plan()
        } else {
            self.scheduler.poll_plan(state)
        };
        let delay = self.scheduler.next_poll_delay_in_use(
            state,
            self.connectivity,
            self.tracker.time_since_wake_request(now),
            self.tracker.in_use(),
        );
        debug!("polling {} categories while {state}, next in {}s", plan.len(), delay.as_secs());
        self.next_poll_at = Some(now + delay);
        Action::Poll(plan)
    }

    fn reconnect_delay(&self, now: Timestamp) -> Duration {
        self.scheduler.next_poll_delay(
            self.tracker.state(now),
            self.connectivity,
            self.tracker.time_since_wake_request(now),
        )
    }

    pub fn identity(&self) -> &VehicleIdentity {
        &self.identity
    }

    pub fn state(&self, now: Timestamp) -> VehicleState {
        self.tracker.state(now)
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity
    }

    pub fn episode(&self) -> Episode {
        self.episode
    }

    pub fn sink(&self) -> &TelemetrySink {
        &self.sink
    }

    pub fn params(&self) -> &PollingParameters {
        self.scheduler.params()
    }

    pub fn next_poll_at(&self) -> Option<Timestamp> {
        self.next_poll_at
    }

    pub fn next_connect_at(&self) -> Timestamp {
        self.next_connect_at
    }

    pub fn time_disconnected(&self, now: Timestamp) -> Option<Duration> {
        self.staleness.time_disconnected(now)
    }
}

#[cfg(test)]
mod test {
    use crate::{
        clock::Timestamp,
        identity::VehicleIdentity,
        params::{PollingParameters, RawPollingParameters},
        scheduler::RequestCategory,
        sink::TelemetrySink,
        telemetry::{Attribute, ChargingState, TelemetryEvent},
        vehicle_state::{ChargingPredicate, ConnectivityState, VehicleState},
    };

    use super::{Action, Episode, VehicleMonitor};

    const VIN: &str = "5YJ3E1EA7KF000001";

    fn t(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    fn monitor() -> VehicleMonitor {
        let raw = RawPollingParameters {
            post_wake_poll_time: Some(120),
            poll_data_period: Some(15),
            poll_asleep_period: Some(600),
            poll_charging_period: Some(10),
            ble_disconnected_min_time: Some(30),
        };
        VehicleMonitor::new(
            VehicleIdentity::new(VIN).unwrap(),
            PollingParameters::load(&raw, std::time::Duration::from_secs(1)).unwrap(),
            ChargingPredicate::default(),
            TelemetrySink::with_all_attributes(),
        )
    }

    fn battery(level: f64) -> Vec<TelemetryEvent> {
        vec![TelemetryEvent::new(Attribute::BatteryLevel, level)]
    }

    fn asleep(flag: bool) -> Vec<TelemetryEvent> {
        vec![TelemetryEvent::new(Attribute::Asleep, flag)]
    }

    fn connect(monitor: &mut VehicleMonitor, now: Timestamp) -> Episode {
        assert_eq!(monitor.on_tick(now).actions, vec![Action::Connect]);
        monitor.on_connecting();
        monitor.on_connected(now)
    }

    #[test]
    fn first_tick_connects_once() {
        let mut monitor = monitor();
        assert_eq!(monitor.on_tick(t(0)).actions, vec![Action::Connect]);
        monitor.on_connecting();
        assert!(monitor.on_tick(t(1)).is_empty());
        assert_eq!(monitor.connectivity(), ConnectivityState::Connecting);
    }

    #[test]
    fn failed_connect_retries_after_delay() {
        let mut monitor = monitor();
        connect_attempt_fails(&mut monitor, t(0));
        assert!(monitor.on_tick(t(9)).actions.is_empty());
        assert_eq!(monitor.on_tick(t(10)).actions, vec![Action::Connect]);
    }

    fn connect_attempt_fails(monitor: &mut VehicleMonitor, now: Timestamp) {
        monitor.on_tick(now);
        monitor.on_connecting();
        monitor.on_transport_failure(now);
    }

    #[test]
    fn connection_polls_status_first_then_everything_once_awake() {
        let mut monitor = monitor();
        let episode = connect(&mut monitor, t(0));
        assert_eq!(
            monitor.on_tick(t(0)).actions,
            vec![Action::Poll(vec![RequestCategory::VehicleStatus])]
        );

        monitor.on_response(episode, &asleep(false), t(1));
        assert_eq!(monitor.state(t(1)), VehicleState::Awake);
        assert_eq!(monitor.next_poll_at(), Some(t(1)));

        let tick = monitor.on_tick(t(1));
        let [Action::Poll(plan)] = tick.actions.as_slice() else {
            panic!("expected a single poll, got {:?}", tick.actions);
        };
        assert!(plan.contains(&RequestCategory::ChargeState));
        assert_eq!(monitor.next_poll_at(), Some(t(16)));
    }

    #[test]
    fn asleep_vehicle_is_polled_slowly_and_safely() {
        let mut monitor = monitor();
        let episode = connect(&mut monitor, t(0));
        monitor.on_tick(t(0));
        monitor.on_response(episode, &asleep(true), t(1));
        assert_eq!(monitor.next_poll_at(), Some(t(15)));
        assert_eq!(
            monitor.on_tick(t(15)).actions,
            vec![Action::Poll(vec![RequestCategory::VehicleStatus])]
        );
        assert_eq!(monitor.next_poll_at(), Some(t(615)));
    }

    #[test]
    fn wake_request_sends_wake_and_polls_fast() {
        let mut monitor = monitor();
        let episode = connect(&mut monitor, t(0));
        monitor.on_tick(t(0));
        monitor.on_response(episode, &asleep(true), t(0));

        let actions = monitor.request_wake(t(5));
        assert_eq!(actions.first(), Some(&Action::Wake));
        assert!(matches!(actions.get(1), Some(Action::Poll(plan)) if plan.len() == 5));
        assert_eq!(monitor.state(t(5)), VehicleState::Waking);
        // min(data 15, charging 10)
        assert_eq!(monitor.next_poll_at(), Some(t(15)));

        monitor.on_response(episode, &asleep(false), t(6));
        assert_eq!(monitor.state(t(6)), VehicleState::Waking);
        assert_eq!(monitor.next_poll_at(), Some(t(15)));
    }

    #[test]
    fn wake_while_disconnected_runs_after_connecting() {
        let mut monitor = monitor();
        assert!(monitor.request_wake(t(0)).is_empty());
        connect(&mut monitor, t(0));
        assert_eq!(monitor.on_tick(t(0)).actions.first(), Some(&Action::Wake));
    }

    #[test]
    fn force_update_polls_everything_on_next_tick() {
        let mut monitor = monitor();
        let episode = connect(&mut monitor, t(0));
        monitor.on_tick(t(0));
        monitor.on_response(episode, &asleep(true), t(0));

        monitor.force_update(t(3));
        let tick = monitor.on_tick(t(3));
        assert!(!tick.actions.contains(&Action::Wake));
        assert!(matches!(tick.actions.as_slice(), [Action::Poll(plan)] if plan.len() == 5));
        assert_eq!(
            monitor.on_tick(t(603)).actions,
            vec![Action::Poll(vec![RequestCategory::VehicleStatus])]
        );
    }

    #[test]
    fn response_before_first_connection_is_discarded() {
        let mut monitor = monitor();
        monitor.on_tick(t(0));
        monitor.on_connecting();
        assert!(monitor.episode().is_initial());

        assert!(monitor.on_response(monitor.episode(), &battery(80.0), t(1)).is_empty());
        assert!(!monitor.sink().any_known());
        assert_eq!(monitor.state(t(1)), VehicleState::Unknown);
    }

    #[test]
    fn unlocked_vehicle_is_polled_at_charging_cadence() {
        let mut monitor = monitor();
        let episode = connect(&mut monitor, t(0));
        monitor.on_tick(t(0));
        let unlocked = vec![
            TelemetryEvent::new(Attribute::Asleep, false),
            TelemetryEvent::new(Attribute::Unlocked, true),
        ];
        monitor.on_response(episode, &unlocked, t(1));
        monitor.on_tick(t(1));
        assert_eq!(monitor.next_poll_at(), Some(t(11)));

        monitor.on_response(episode, &[TelemetryEvent::new(Attribute::Unlocked, false)], t(11));
        monitor.on_tick(t(11));
        assert_eq!(monitor.next_poll_at(), Some(t(26)));
    }

    #[test]
    fn notifications_only_on_change() {
        let mut monitor = monitor();
        let episode = connect(&mut monitor, t(0));
        assert_eq!(monitor.on_response(episode, &battery(70.0), t(1)).len(), 1);
        assert!(monitor.on_response(episode, &battery(70.0), t(2)).is_empty());
    }

    #[test]
    fn staleness_blanks_channels_and_resets_state() {
        let mut monitor = monitor();
        let episode = connect(&mut monitor, t(0));
        monitor.on_response(episode, &battery(70.0), t(0));
        monitor.on_disconnected(t(0));

        assert!(monitor.on_tick(t(29)).notifications.is_empty());
        assert_eq!(monitor.state(t(29)), VehicleState::Awake);

        let tick = monitor.on_tick(t(31));
        assert_eq!(tick.notifications.len(), 1);
        assert!(tick.notifications[0].is_unknown());
        assert_eq!(monitor.state(t(31)), VehicleState::Unknown);
        assert!(!monitor.sink().any_known());
    }

    #[test]
    fn late_response_after_timeout_stays_unknown() {
        let mut monitor = monitor();
        let episode = connect(&mut monitor, t(0));
        monitor.on_response(episode, &battery(70.0), t(0));
        monitor.on_disconnected(t(0));
        monitor.on_tick(t(31));

        assert!(monitor.on_response(episode, &battery(71.0), t(32)).is_empty());
        let channel = monitor.sink().channel(Attribute::BatteryLevel).unwrap();
        assert!(!channel.is_known());
        assert_eq!(monitor.state(t(32)), VehicleState::Unknown);
    }

    #[test]
    fn response_from_previous_episode_is_discarded() {
        let mut monitor = monitor();
        let first = connect(&mut monitor, t(0));
        monitor.on_disconnected(t(1));
        let second = connect(&mut monitor, t(11));
        assert_ne!(first, second);

        let charging = vec![TelemetryEvent::new(
            Attribute::ChargingState,
            ChargingState::Charging,
        )];
        assert!(monitor.on_response(first, &charging, t(12)).is_empty());
        assert_eq!(monitor.state(t(12)), VehicleState::Unknown);
        assert_eq!(monitor.on_response(second, &charging, t(12)).len(), 1);
        assert_eq!(monitor.state(t(12)), VehicleState::Charging);
    }

    #[test]
    fn values_come_back_after_reconnect() {
        let mut monitor = monitor();
        let episode = connect(&mut monitor, t(0));
        monitor.on_response(episode, &battery(70.0), t(0));
        monitor.on_disconnected(t(0));
        monitor.on_tick(t(30));
        assert!(!monitor.sink().any_known());

        let episode = connect(&mut monitor, t(40));
        let notifications = monitor.on_response(episode, &battery(70.0), t(41));
        assert_eq!(notifications.len(), 1);
        assert!(monitor.sink().any_known());
    }
}
