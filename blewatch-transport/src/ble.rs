use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use btleplug::{
    api::{
        Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
        WriteType,
    },
    platform::{Adapter, Manager, Peripheral},
};
use futures::StreamExt;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use blewatch_domain::{identity::VehicleIdentity, scheduler::RequestCategory};

use crate::{
    Transport, TransportError, TransportEvent,
    frame::{
        FrameAssembler, FrameDecoder, JsonFrameDecoder, JsonRequestEncoder, RequestEncoder,
        encode_frame, write_chunks,
    },
};

/// GATT service advertised by the vehicle.
pub const VEHICLE_SERVICE_UUID: Uuid = Uuid::from_u128(0x00000211_b2d1_43f0_9b88_960cebf8b91e);
/// Characteristic requests are written to.
pub const WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00000212_b2d1_43f0_9b88_960cebf8b91e);
/// Characteristic responses are notified on.
pub const NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00000213_b2d1_43f0_9b88_960cebf8b91e);

const SCAN_TIMEOUT: Duration = Duration::from_secs(5);
const SCAN_POLL: Duration = Duration::from_millis(500);

struct Link {
    peripheral: Peripheral,
    write: Characteristic,
    pump: JoinHandle<()>,
}

pub struct BleTransport {
    adapter: Adapter,
    link: Option<Link>,
    decoder: Arc<dyn FrameDecoder>,
    encoder: Box<dyn RequestEncoder>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl BleTransport {
    pub async fn new() -> Result<BleTransport, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .pop()
            .ok_or(TransportError::NoAdapter)?;
        Ok(BleTransport::with_codec(
            adapter,
            Arc::new(JsonFrameDecoder),
            Box::new(JsonRequestEncoder),
        ))
    }

    pub fn with_codec(
        adapter: Adapter,
        decoder: Arc<dyn FrameDecoder>,
        encoder: Box<dyn RequestEncoder>,
    ) -> BleTransport {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        BleTransport {
            adapter,
            link: None,
            decoder,
            encoder,
            events_tx,
            events_rx,
        }
    }

    async fn find_vehicle(&self, identity: &VehicleIdentity) -> Result<Peripheral, TransportError> {
        trace!("scanning for service {VEHICLE_SERVICE_UUID}");
        self.adapter
            .start_scan(ScanFilter {
                services: vec![VEHICLE_SERVICE_UUID],
            })
            .await?;

        let found = self.wait_for_vehicle(identity).await;
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("failed to stop scan: {e}");
        }
        found?.ok_or_else(|| TransportError::VehicleNotFound(identity.to_string()))
    }

    async fn wait_for_vehicle(
        &self,
        identity: &VehicleIdentity,
    ) -> Result<Option<Peripheral>, TransportError> {
        let deadline = Instant::now() + SCAN_TIMEOUT;
        loop {
            if let Some(peripheral) = self.matching_peripheral(identity).await? {
                return Ok(Some(peripheral));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            time::sleep(SCAN_POLL).await;
        }
    }

    async fn matching_peripheral(
        &self,
        identity: &VehicleIdentity,
    ) -> Result<Option<Peripheral>, TransportError> {
        for peripheral in self.adapter.peripherals().await? {
            let Some(properties) = peripheral.properties().await? else {
                continue;
            };
            let matches = match identity.ble_name() {
                Some(name) => properties.local_name.as_deref() == Some(name),
                None => properties.services.contains(&VEHICLE_SERVICE_UUID),
            };
            if matches {
                debug!(
                    "found vehicle peripheral {:?} (rssi {:?})",
                    properties.local_name, properties.rssi
                );
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }

    async fn open_link(&self, peripheral: Peripheral) -> Result<Link, TransportError> {
        peripheral.connect().await?;
        let attached = self.attach(&peripheral).await;
        let (write, pump) = cleanup_on_error(attached, peripheral.disconnect()).await?;
        Ok(Link {
            peripheral,
            write,
            pump,
        })
    }

    /// Finds the characteristics, subscribes, reports [`TransportEvent::Connected`] and
    /// only then starts forwarding notifications.
    async fn attach(
        &self,
        peripheral: &Peripheral,
    ) -> Result<(Characteristic, JoinHandle<()>), TransportError> {
        trace!("connected, discovering services");
        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();
        let find = |uuid: Uuid| {
            characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or(TransportError::CharacteristicNotFound(uuid))
        };
        let write = find(WRITE_CHARACTERISTIC_UUID)?;
        let notify = find(NOTIFY_CHARACTERISTIC_UUID)?;
        peripheral.subscribe(&notify).await?;

        let notifications = peripheral.notifications().await?;
        let central_events = self.adapter.events().await?;
        let peripheral_id = peripheral.id();
        let decoder = self.decoder.clone();
        let tx = self.events_tx.clone();
        let _ = tx.send(TransportEvent::Connected);

        let pump = tokio::spawn(async move {
            let mut notifications = notifications;
            let mut central_events = central_events;
            let mut assembler = FrameAssembler::default();
            loop {
                tokio::select! {
                    notification = notifications.next() => {
                        let Some(notification) = notification else {
                            debug!("notification stream ended");
                            break;
                        };
                        if notification.uuid != NOTIFY_CHARACTERISTIC_UUID {
                            continue;
                        }
                        trace!("received {} bytes", notification.value.len());
                        for payload in assembler.push(&notification.value) {
                            match decoder.decode(&payload) {
                                Ok(events) => {
                                    if tx.send(TransportEvent::Response(events)).is_err() {
                                        return;
                                    }
                                }
                                Err(e) => error!("dropping undecodable frame: {e}"),
                            }
                        }
                    }
                    event = central_events.next() => match event {
                        Some(CentralEvent::DeviceDisconnected(id)) if id == peripheral_id => {
                            info!("vehicle dropped the link");
                            break;
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
            }
            let _ = tx.send(TransportEvent::Disconnected);
        });

        Ok((write, pump))
    }

    async fn write_payload(&self, payload: &[u8]) -> Result<(), TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        let frame = encode_frame(payload)?;
        for chunk in write_chunks(&frame) {
            link.peripheral
                .write(&link.write, chunk, WriteType::WithResponse)
                .await?;
        }
        trace!("wrote {} byte frame", frame.len());
        Ok(())
    }
}

/// Awaits `cleanup` only if `result` failed; the original error wins.
async fn cleanup_on_error<T>(
    result: Result<T, TransportError>,
    cleanup: impl Future<Output = Result<(), btleplug::Error>>,
) -> Result<T, TransportError> {
    if result.is_err()
        && let Err(e) = cleanup.await
    {
        debug!("cleanup after failure also failed: {e}");
    }
    result
}

#[async_trait]
impl Transport for BleTransport {
    async fn connect(&mut self, identity: &VehicleIdentity) -> Result<(), TransportError> {
        if let Some(old) = self.link.take() {
            warn!("connect while linked, dropping previous link");
            old.pump.abort();
            let _ = old.peripheral.disconnect().await;
        }
        let peripheral = self.find_vehicle(identity).await?;
        self.link = Some(self.open_link(peripheral).await?);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let Some(link) = self.link.take() else {
            return Ok(());
        };
        link.pump.abort();
        link.peripheral.disconnect().await?;
        let _ = self.events_tx.send(TransportEvent::Disconnected);
        Ok(())
    }

    async fn send_request(&mut self, category: RequestCategory) -> Result<(), TransportError> {
        let payload = self.encoder.encode_request(category)?;
        debug!("requesting {category}");
        self.write_payload(&payload).await
    }

    async fn wake(&mut self) -> Result<(), TransportError> {
        let payload = self.encoder.encode_wake()?;
        info!("sending wake");
        self.write_payload(&payload).await
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        let event = self.events_rx.recv().await;
        if matches!(event, Some(TransportEvent::Disconnected)) {
            self.link = None;
        }
        event
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use crate::TransportError;

    use super::{NOTIFY_CHARACTERISTIC_UUID, cleanup_on_error};

    fn cleanup(
        ran: &Arc<AtomicBool>,
        outcome: Result<(), btleplug::Error>,
    ) -> impl Future<Output = Result<(), btleplug::Error>> + use<> {
        let ran = ran.clone();
        async move {
            ran.store(true, Ordering::SeqCst);
            outcome
        }
    }

    #[tokio::test]
    async fn failed_setup_is_cleaned_up() {
        let ran = Arc::new(AtomicBool::new(false));
        let result: Result<(), _> = cleanup_on_error(
            Err(TransportError::CharacteristicNotFound(NOTIFY_CHARACTERISTIC_UUID)),
            cleanup(&ran, Ok(())),
        )
        .await;
        assert!(ran.load(Ordering::SeqCst));
        assert!(matches!(result, Err(TransportError::CharacteristicNotFound(_))));
    }

    #[tokio::test]
    async fn original_error_survives_failed_cleanup() {
        let ran = Arc::new(AtomicBool::new(false));
        let result: Result<(), _> = cleanup_on_error(
            Err(TransportError::NotConnected),
            cleanup(&ran, Err(btleplug::Error::NotConnected)),
        )
        .await;
        assert!(ran.load(Ordering::SeqCst));
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn successful_setup_keeps_the_link() {
        let ran = Arc::new(AtomicBool::new(false));
        let result = cleanup_on_error(Ok(7), cleanup(&ran, Ok(()))).await;
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(result.unwrap(), 7);
    }
}
