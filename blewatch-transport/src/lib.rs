pub mod ble;
pub mod frame;
pub mod simulated;

use async_trait::async_trait;
use blewatch_domain::{
    identity::VehicleIdentity, scheduler::RequestCategory, telemetry::TelemetryEvent,
};
use thiserror::Error;

use crate::{ble::BleTransport, frame::FrameError, simulated::{SimulatedTransport, SimulatedVehicle}};

/// What the link reports back, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Response(Vec<TelemetryEvent>),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no Bluetooth adapters found")]
    NoAdapter,
    #[error("vehicle {0} not found while scanning")]
    VehicleNotFound(String),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(uuid::Uuid),
    #[error("not connected")]
    NotConnected,
    #[error(transparent)]
    Ble(#[from] btleplug::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// A link to one vehicle.
///
/// Connectivity changes and decoded responses are delivered through
/// [`Transport::next_event`], never as return values.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self, identity: &VehicleIdentity) -> Result<(), TransportError>;
    async fn disconnect(&mut self) -> Result<(), TransportError>;
    async fn send_request(&mut self, category: RequestCategory) -> Result<(), TransportError>;
    async fn wake(&mut self) -> Result<(), TransportError>;
    /// Cancel safe; `None` once the transport can deliver nothing more.
    async fn next_event(&mut self) -> Option<TransportEvent>;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn connect(&mut self, identity: &VehicleIdentity) -> Result<(), TransportError> {
        (**self).connect(identity).await
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        (**self).disconnect().await
    }

    async fn send_request(&mut self, category: RequestCategory) -> Result<(), TransportError> {
        (**self).send_request(category).await
    }

    async fn wake(&mut self) -> Result<(), TransportError> {
        (**self).wake().await
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        (**self).next_event().await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum TransportMode {
    /// talk to the vehicle over the local Bluetooth adapter
    Ble,
    /// scripted vehicle, no hardware needed
    Simulated,
}

impl TransportMode {
    pub async fn create_transport(&self) -> Result<Box<dyn Transport>, TransportError> {
        match self {
            TransportMode::Ble => Ok(Box::new(BleTransport::new().await?)),
            TransportMode::Simulated => {
                Ok(Box::new(SimulatedTransport::new(SimulatedVehicle::default())))
            }
        }
    }
}
