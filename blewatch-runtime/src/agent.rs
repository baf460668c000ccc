use std::time::Duration;

use chrono::Utc;
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use blewatch_domain::{
    clock::Clock,
    monitor::{Action, VehicleMonitor},
    report::SensorReport,
    sink::Notification,
};
use blewatch_sinks::history::NotificationSink;
use blewatch_transport::{Transport, TransportEvent};

use crate::{
    clock::TokioClock,
    snapshot::{SharedSnapshot, Snapshot},
};

const COMMAND_BUFFER: usize = 16;

/// Requests from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Wake,
    ForceUpdate,
    Shutdown,
}

/// The host's side of a running agent.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    commands: mpsc::Sender<Command>,
    snapshot: SharedSnapshot,
}

impl AgentHandle {
    /// Returns false once the agent has stopped.
    pub async fn send(&self, command: Command) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// For callers that cannot await, such as a UI key handler.
    pub fn try_send(&self, command: Command) -> bool {
        self.commands.try_send(command).is_ok()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.read()
    }
}

/// Owns the monitor, the transport and the sinks, and drives them from one task.
pub struct Agent<T, C = TokioClock> {
    monitor: VehicleMonitor,
    transport: T,
    clock: C,
    sinks: Vec<Box<dyn NotificationSink>>,
    commands: mpsc::Receiver<Command>,
    snapshot: SharedSnapshot,
    tick_period: Duration,
}

impl<T: Transport> Agent<T, TokioClock> {
    pub fn new(
        monitor: VehicleMonitor,
        transport: T,
        sinks: Vec<Box<dyn NotificationSink>>,
        tick_period: Duration,
    ) -> (Agent<T, TokioClock>, AgentHandle) {
        Agent::with_clock(monitor, transport, TokioClock::new(), sinks, tick_period)
    }
}

impl<T: Transport, C: Clock + Send> Agent<T, C> {
    pub fn with_clock(
        monitor: VehicleMonitor,
        transport: T,
        clock: C,
        sinks: Vec<Box<dyn NotificationSink>>,
        tick_period: Duration,
    ) -> (Agent<T, C>, AgentHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let snapshot = SharedSnapshot::default();
        let now = clock.now();
        snapshot.update(|s| s.refresh(&monitor, now));
        let agent = Agent {
            monitor,
            transport,
            clock,
            sinks,
            commands: rx,
            snapshot: snapshot.clone(),
            tick_period,
        };
        let handle = AgentHandle {
            commands: tx,
            snapshot,
        };
        (agent, handle)
    }

    /// Runs until [`Command::Shutdown`], every handle is dropped, or the transport gives up.
    pub async fn run(mut self) {
        info!(
            "monitoring {} every {}s",
            self.monitor.identity(),
            self.tick_period.as_secs()
        );
        let mut ticker = time::interval(self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.drive().await;
                }
                event = self.transport.next_event() => {
                    let Some(event) = event else {
                        warn!("transport closed, stopping");
                        break;
                    };
                    self.on_transport_event(event).await;
                }
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.on_command(command).await,
                    }
                }
            }
            self.refresh_snapshot();
        }

        self.shutdown().await;
    }

    async fn drive(&mut self) {
        let now = self.clock.now();
        let tick = self.monitor.on_tick(now);
        self.publish(&tick.notifications).await;
        self.execute(tick.actions).await;
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        let now = self.clock.now();
        match event {
            TransportEvent::Connected => {
                self.monitor.on_connected(now);
            }
            TransportEvent::Disconnected => {
                self.monitor.on_disconnected(now);
            }
            TransportEvent::Response(events) => {
                let episode = self.monitor.episode();
                let notifications = self.monitor.on_response(episode, &events, now);
                self.publish(&notifications).await;
            }
        }
        self.drive().await;
    }

    async fn on_command(&mut self, command: Command) {
        let now = self.clock.now();
        debug!("host command {command:?}");
        match command {
            Command::Wake => {
                let actions = self.monitor.request_wake(now);
                self.execute(actions).await;
            }
            Command::ForceUpdate => {
                self.monitor.force_update(now);
                self.drive().await;
            }
            Command::Shutdown => {}
        }
    }

    async fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            let result = match action {
                Action::Connect => {
                    self.monitor.on_connecting();
                    self.refresh_snapshot();
                    self.transport.connect(self.monitor.identity()).await
                }
                Action::Wake => self.transport.wake().await,
                Action::Poll(categories) => {
                    let mut result = Ok(());
                    for category in categories {
                        result = self.transport.send_request(category).await;
                        if result.is_err() {
                            break;
                        }
                    }
                    result
                }
            };

            if let Err(e) = result {
                warn!("transport failure: {e}");
                if let Err(e) = self.transport.disconnect().await {
                    debug!("disconnect after failure also failed: {e}");
                }
                self.monitor.on_transport_failure(self.clock.now());
                break;
            }
        }
    }

    async fn publish(&mut self, notifications: &[Notification]) {
        if notifications.is_empty() {
            return;
        }
        let date_time = Utc::now();
        let reports: Vec<SensorReport> = notifications
            .iter()
            .map(|n| SensorReport::from_notification(date_time, n))
            .collect();

        for sink in &mut self.sinks {
            if let Err(e) = sink.save(&reports).await {
                error!("failed to record {} reports: {e}", reports.len());
            }
        }
        self.snapshot.update(|s| s.record(&reports));
    }

    fn refresh_snapshot(&self) {
        let now = self.clock.now();
        self.snapshot.update(|s| s.refresh(&self.monitor, now));
    }

    async fn shutdown(mut self) {
        info!("shutting down");
        if let Err(e) = self.transport.disconnect().await {
            warn!("disconnect failed: {e}");
        }
        for sink in self.sinks.drain(..) {
            if let Err(e) = sink.close().await {
                error!("failed to close sink: {e}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::time;

    use blewatch_domain::{
        identity::VehicleIdentity,
        monitor::VehicleMonitor,
        params::{PollingParameters, RawPollingParameters},
        scheduler::RequestCategory,
        sink::TelemetrySink,
        telemetry::{Attribute, TelemetryValue},
        vehicle_state::{ChargingPredicate, ConnectivityState, VehicleState},
    };
    use blewatch_transport::simulated::{SimulatedTransport, SimulatedVehicle};

    use super::{Agent, AgentHandle, Command};

    fn monitor() -> VehicleMonitor {
        let raw = RawPollingParameters {
            post_wake_poll_time: Some(120),
            poll_data_period: Some(15),
            poll_asleep_period: Some(600),
            poll_charging_period: Some(10),
            ble_disconnected_min_time: Some(30),
        };
        VehicleMonitor::new(
            VehicleIdentity::new("5YJ3E1EA7KF000001").unwrap(),
            PollingParameters::load(&raw, Duration::from_secs(1)).unwrap(),
            ChargingPredicate::default(),
            TelemetrySink::with_all_attributes(),
        )
    }

    fn start(vehicle: &SimulatedVehicle) -> (tokio::task::JoinHandle<()>, AgentHandle) {
        let transport = SimulatedTransport::new(vehicle.clone());
        let (agent, handle) = Agent::new(monitor(), transport, vec![], Duration::from_secs(1));
        (tokio::spawn(agent.run()), handle)
    }

    fn reading(handle: &AgentHandle, attribute: Attribute) -> Option<TelemetryValue> {
        handle
            .snapshot()
            .readings
            .into_iter()
            .find(|r| r.attribute == attribute)
            .and_then(|r| r.value)
    }

    #[tokio::test(start_paused = true)]
    async fn sleeping_vehicle_is_only_asked_for_status() {
        let vehicle = SimulatedVehicle::default();
        let (task, handle) = start(&vehicle);

        time::sleep(Duration::from_secs(2)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.connectivity, ConnectivityState::Connected);
        assert_eq!(snapshot.state, VehicleState::Asleep);
        assert_eq!(reading(&handle, Attribute::Asleep), Some(true.into()));
        assert!(
            vehicle
                .requests()
                .iter()
                .all(|c| *c == RequestCategory::VehicleStatus)
        );
        assert!(vehicle.is_asleep());

        assert!(handle.send(Command::Shutdown).await);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn wake_command_wakes_and_polls_everything() {
        let vehicle = SimulatedVehicle::default();
        let (task, handle) = start(&vehicle);
        time::sleep(Duration::from_secs(2)).await;

        handle.send(Command::Wake).await;
        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(vehicle.wakes(), 1);
        assert_eq!(handle.snapshot().state, VehicleState::Waking);
        assert!(vehicle.requests().contains(&RequestCategory::ChargeState));
        assert_eq!(reading(&handle, Attribute::BatteryLevel), Some(64.0.into()));

        handle.send(Command::Shutdown).await;
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lost_vehicle_goes_unknown_and_comes_back() {
        let vehicle = SimulatedVehicle::awake();
        let (task, handle) = start(&vehicle);
        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.snapshot().state, VehicleState::Awake);
        assert!(reading(&handle, Attribute::Odometer).is_some());

        vehicle.set_reachable(false);
        vehicle.drop_link();
        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(handle.snapshot().connectivity, ConnectivityState::Disconnected);
        assert!(reading(&handle, Attribute::Odometer).is_some());

        time::sleep(Duration::from_secs(15)).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.known_count(), 0);
        assert_eq!(snapshot.state, VehicleState::Unknown);
        assert!(snapshot.recent.iter().any(|r| r.is_unknown()));

        vehicle.set_reachable(true);
        time::sleep(Duration::from_secs(15)).await;
        assert_eq!(handle.snapshot().connectivity, ConnectivityState::Connected);
        assert!(reading(&handle, Attribute::Odometer).is_some());

        handle.send(Command::Shutdown).await;
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_stops_the_agent() {
        let vehicle = SimulatedVehicle::default();
        let (task, handle) = start(&vehicle);
        drop(handle);
        task.await.unwrap();
    }
}
