//! Length-prefixed framing over a BLE characteristic, and the JSON payload codec.
//!
//! A frame is a 2-byte big-endian payload length followed by the payload. The whole
//! frame never exceeds [`MAX_FRAME_LEN`]; writes go out in [`WRITE_CHUNK_LEN`] pieces.

use blewatch_domain::{scheduler::RequestCategory, telemetry::TelemetryEvent};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, trace, warn};

pub const MAX_FRAME_LEN: usize = 1024;
pub const WRITE_CHUNK_LEN: usize = 20;
const HEADER_LEN: usize = 2;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("payload of {0} bytes does not fit in a frame")]
    TooLong(usize),
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload has no 'events' array")]
    MissingEvents,
}

/// Prefixes `payload` with its length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_FRAME_LEN - HEADER_LEN {
        return Err(FrameError::TooLong(payload.len()));
    }
    let len = payload.len() as u16;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

pub fn write_chunks(frame: &[u8]) -> impl Iterator<Item = &[u8]> {
    frame.chunks(WRITE_CHUNK_LEN)
}

/// Reassembles notification chunks into complete payloads.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
}

impl FrameAssembler {
    /// Appends a chunk and returns every payload it completed.
    ///
    /// A length header over the maximum frame size drops everything buffered, so the
    /// partial frame left behind never exceeds [`MAX_FRAME_LEN`].
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        if chunk.is_empty() {
            warn!("received empty chunk");
            return vec![];
        }
        self.buffer.extend_from_slice(chunk);

        let mut payloads = vec![];
        while self.buffer.len() >= HEADER_LEN {
            let expected = u16::from_be_bytes([self.buffer[0], self.buffer[1]]) as usize;
            if expected > MAX_FRAME_LEN - HEADER_LEN {
                error!(
                    "frame length {expected} exceeds {MAX_FRAME_LEN} bytes, discarding {} buffered",
                    self.buffer.len()
                );
                self.buffer.clear();
                break;
            }
            if self.buffer.len() < HEADER_LEN + expected {
                trace!(
                    "buffered {}/{} bytes, waiting for more",
                    self.buffer.len(),
                    HEADER_LEN + expected
                );
                break;
            }
            let frame: Vec<u8> = self.buffer.drain(..HEADER_LEN + expected).collect();
            payloads.push(frame[HEADER_LEN..].to_vec());
        }
        payloads
    }

    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Turns a complete payload into decoded attribute updates.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<Vec<TelemetryEvent>, FrameError>;
}

/// Builds the payloads for outgoing requests.
pub trait RequestEncoder: Send + Sync {
    fn encode_request(&self, category: RequestCategory) -> Result<Vec<u8>, FrameError>;
    fn encode_wake(&self) -> Result<Vec<u8>, FrameError>;
}

/// Reads `{"events":[{"attribute":..,"value":..}]}`; entries that fail to parse are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFrameDecoder;

impl FrameDecoder for JsonFrameDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Vec<TelemetryEvent>, FrameError> {
        let json_value = serde_json::from_slice::<serde_json::Value>(payload)?;
        let entries = json_value
            .get("events")
            .and_then(|e| e.as_array())
            .ok_or(FrameError::MissingEvents)?;
        trace!("found {} events in payload", entries.len());

        let mut events = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<TelemetryEvent>(entry.clone()) {
                Ok(event) => events.push(event),
                Err(e) => error!("failed to parse event {entry}: {e}, skipping"),
            }
        }
        Ok(events)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Outgoing {
    Request(RequestCategory),
    Command(&'static str),
}

/// Writes `{"request":"charge_state"}` and `{"command":"wake"}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRequestEncoder;

impl RequestEncoder for JsonRequestEncoder {
    fn encode_request(&self, category: RequestCategory) -> Result<Vec<u8>, FrameError> {
        Ok(serde_json::to_vec(&Outgoing::Request(category))?)
    }

    fn encode_wake(&self) -> Result<Vec<u8>, FrameError> {
        Ok(serde_json::to_vec(&Outgoing::Command("wake"))?)
    }
}
