use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use blewatch_domain::{
    identity::VehicleIdentity,
    scheduler::RequestCategory,
    telemetry::{Attribute, ChargingState, ShiftState, TelemetryEvent},
};

use crate::{Transport, TransportError, TransportEvent};

#[derive(Debug)]
struct Model {
    reachable: bool,
    linked: bool,
    asleep: bool,
    locked: bool,
    plugged_in: bool,
    charging: ChargingState,
    battery_level: f64,
    max_soc: f64,
    odometer: f64,
    inside_temp: f64,
    requests: Vec<RequestCategory>,
    wakes: usize,
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
}

impl Default for Model {
    fn default() -> Self {
        Model {
            reachable: true,
            linked: false,
            asleep: true,
            locked: true,
            plugged_in: false,
            charging: ChargingState::Disconnected,
            battery_level: 64.0,
            max_soc: 80.0,
            odometer: 23_118.0,
            inside_temp: 19.5,
            requests: vec![],
            wakes: 0,
            events: None,
        }
    }
}

impl Model {
    fn emit(&self, event: TransportEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn respond(&mut self, category: RequestCategory) -> Vec<TelemetryEvent> {
        self.requests.push(category);
        if category.wakes_vehicle() && self.asleep {
            debug!("{category} woke the simulated vehicle");
            self.asleep = false;
        }
        match category {
            RequestCategory::VehicleStatus => vec![
                TelemetryEvent::new(Attribute::Asleep, self.asleep),
                TelemetryEvent::new(Attribute::Unlocked, !self.locked),
                TelemetryEvent::new(Attribute::UserPresent, false),
            ],
            RequestCategory::ChargeState => {
                if self.charging == ChargingState::Charging {
                    self.battery_level = (self.battery_level + 1.0).min(self.max_soc);
                    if self.battery_level >= self.max_soc {
                        self.charging = ChargingState::Complete;
                    }
                }
                let charging = self.charging == ChargingState::Charging;
                vec![
                    TelemetryEvent::new(Attribute::BatteryLevel, self.battery_level),
                    TelemetryEvent::new(Attribute::ChargingState, self.charging),
                    TelemetryEvent::new(Attribute::ChargerConnected, self.plugged_in),
                    TelemetryEvent::new(Attribute::ChargeCurrent, if charging { 16.0 } else { 0.0 }),
                    TelemetryEvent::new(Attribute::ChargePower, if charging { 11.0 } else { 0.0 }),
                    TelemetryEvent::new(Attribute::MaxSoc, self.max_soc),
                    TelemetryEvent::new(Attribute::MaxAmps, 16.0),
                    TelemetryEvent::new(Attribute::BatteryRange, (self.battery_level * 4.2).round()),
                ]
            }
            RequestCategory::ClimateState => vec![
                TelemetryEvent::new(Attribute::ClimateOn, false),
                TelemetryEvent::new(Attribute::InsideTemp, self.inside_temp),
                TelemetryEvent::new(Attribute::OutsideTemp, 12.0),
            ],
            RequestCategory::DriveState => vec![
                TelemetryEvent::new(Attribute::ShiftState, ShiftState::P),
                TelemetryEvent::new(Attribute::Odometer, self.odometer),
            ],
            RequestCategory::ClosuresState => vec![
                TelemetryEvent::new(Attribute::BootOpen, false),
                TelemetryEvent::new(Attribute::FrunkOpen, false),
                TelemetryEvent::new(Attribute::ChargeFlapOpen, self.plugged_in),
            ],
        }
    }
}

/// Handle to a scripted vehicle, shared between the transport and whoever drives the script.
#[derive(Clone, Debug, Default)]
pub struct SimulatedVehicle {
    model: Arc<Mutex<Model>>,
}

impl SimulatedVehicle {
    fn model(&self) -> MutexGuard<'_, Model> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn awake() -> SimulatedVehicle {
        let vehicle = SimulatedVehicle::default();
        vehicle.model().asleep = false;
        vehicle
    }

    pub fn set_asleep(&self, asleep: bool) {
        self.model().asleep = asleep;
    }

    pub fn plug_in(&self) {
        let mut model = self.model();
        model.plugged_in = true;
        model.charging = ChargingState::Charging;
    }

    pub fn unplug(&self) {
        let mut model = self.model();
        model.plugged_in = false;
        model.charging = ChargingState::Disconnected;
    }

    pub fn set_battery_level(&self, level: f64) {
        self.model().battery_level = level;
    }

    /// Out of radio range: connection attempts fail until this is set back.
    pub fn set_reachable(&self, reachable: bool) {
        self.model().reachable = reachable;
    }

    /// Drops an established link, as if the vehicle drove off.
    pub fn drop_link(&self) {
        let mut model = self.model();
        if model.linked {
            info!("simulated vehicle dropped the link");
            model.linked = false;
            model.emit(TransportEvent::Disconnected);
        }
    }

    /// Every category requested so far, oldest first.
    pub fn requests(&self) -> Vec<RequestCategory> {
        self.model().requests.clone()
    }

    pub fn wakes(&self) -> usize {
        self.model().wakes
    }

    pub fn is_asleep(&self) -> bool {
        self.model().asleep
    }
}

pub struct SimulatedTransport {
    vehicle: SimulatedVehicle,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl SimulatedTransport {
    pub fn new(vehicle: SimulatedVehicle) -> SimulatedTransport {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        vehicle.model().events = Some(events_tx);
        SimulatedTransport { vehicle, events_rx }
    }

    pub fn vehicle(&self) -> &SimulatedVehicle {
        &self.vehicle
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn connect(&mut self, identity: &VehicleIdentity) -> Result<(), TransportError> {
        let mut model = self.vehicle.model();
        if !model.reachable {
            return Err(TransportError::VehicleNotFound(identity.to_string()));
        }
        model.linked = true;
        model.emit(TransportEvent::Connected);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut model = self.vehicle.model();
        if model.linked {
            model.linked = false;
            model.emit(TransportEvent::Disconnected);
        }
        Ok(())
    }

    async fn send_request(&mut self, category: RequestCategory) -> Result<(), TransportError> {
        let mut model = self.vehicle.model();
        if !model.linked {
            return Err(TransportError::NotConnected);
        }
        let events = model.respond(category);
        model.emit(TransportEvent::Response(events));
        Ok(())
    }

    async fn wake(&mut self) -> Result<(), TransportError> {
        let mut model = self.vehicle.model();
        if !model.linked {
            return Err(TransportError::NotConnected);
        }
        model.wakes += 1;
        model.asleep = false;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }
}

#[cfg(test)]
mod test {
    use blewatch_domain::{
        identity::VehicleIdentity,
        scheduler::RequestCategory,
        telemetry::{Attribute, TelemetryEvent},
    };

    use crate::{Transport, TransportError, TransportEvent};

    use super::{SimulatedTransport, SimulatedVehicle};

    fn identity() -> VehicleIdentity {
        VehicleIdentity::new("5YJ3E1EA7KF000001").unwrap()
    }

    #[tokio::test]
    async fn status_request_keeps_vehicle_asleep() {
        let vehicle = SimulatedVehicle::default();
        let mut transport = SimulatedTransport::new(vehicle.clone());
        transport.connect(&identity()).await.unwrap();
        assert_eq!(transport.next_event().await, Some(TransportEvent::Connected));

        transport
            .send_request(RequestCategory::VehicleStatus)
            .await
            .unwrap();
        let Some(TransportEvent::Response(events)) = transport.next_event().await else {
            panic!("expected a response");
        };
        assert!(events.contains(&TelemetryEvent::new(Attribute::Asleep, true)));
        assert!(vehicle.is_asleep());
    }

    #[tokio::test]
    async fn infotainment_request_wakes_vehicle() {
        let vehicle = SimulatedVehicle::default();
        let mut transport = SimulatedTransport::new(vehicle.clone());
        transport.connect(&identity()).await.unwrap();
        transport.send_request(RequestCategory::ChargeState).await.unwrap();
        assert!(!vehicle.is_asleep());
        assert_eq!(
            vehicle.requests(),
            vec![RequestCategory::ChargeState]
        );
    }

    #[tokio::test]
    async fn unreachable_vehicle_fails_to_connect() {
        let vehicle = SimulatedVehicle::default();
        vehicle.set_reachable(false);
        let mut transport = SimulatedTransport::new(vehicle);
        assert!(matches!(
            transport.connect(&identity()).await,
            Err(TransportError::VehicleNotFound(_))
        ));
        assert!(matches!(
            transport.send_request(RequestCategory::VehicleStatus).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn dropped_link_is_reported() {
        let vehicle = SimulatedVehicle::awake();
        let mut transport = SimulatedTransport::new(vehicle.clone());
        transport.connect(&identity()).await.unwrap();
        transport.next_event().await;
        vehicle.drop_link();
        assert_eq!(transport.next_event().await, Some(TransportEvent::Disconnected));
        assert!(transport.wake().await.is_err());
    }

    #[tokio::test]
    async fn charging_fills_battery_to_limit() {
        let vehicle = SimulatedVehicle::awake();
        vehicle.set_battery_level(79.0);
        vehicle.plug_in();
        let mut transport = SimulatedTransport::new(vehicle.clone());
        transport.connect(&identity()).await.unwrap();
        transport.next_event().await;

        transport.send_request(RequestCategory::ChargeState).await.unwrap();
        let Some(TransportEvent::Response(events)) = transport.next_event().await else {
            panic!("expected a response");
        };
        assert!(events.contains(&TelemetryEvent::new(Attribute::BatteryLevel, 80.0)));
        assert!(events.contains(&TelemetryEvent::new(Attribute::ChargingState, "Complete")));
    }
}
