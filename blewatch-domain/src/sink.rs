use std::{collections::BTreeMap, time::Duration};

use serde::Serialize;

use crate::{
    clock::Timestamp,
    telemetry::{Attribute, TelemetryValue},
};

/// Last known value of one attribute.
///
/// `value` survives [`SensorChannel::mark_unknown`] for inspection, but
/// [`SensorChannel::report`] only hands it out while the channel is known.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorChannel<T> {
    value: Option<T>,
    known: bool,
    last_updated: Option<Timestamp>,
}

impl<T> Default for SensorChannel<T> {
    fn default() -> Self {
        SensorChannel {
            value: None,
            known: false,
            last_updated: None,
        }
    }
}

impl<T: Clone + PartialEq> SensorChannel<T> {
    /// Stores `value`. Returns true if the host needs to hear about it.
    pub fn update(&mut self, value: T, now: Timestamp) -> bool {
        let changed = !self.known || self.value.as_ref() != Some(&value);
        self.value = Some(value);
        self.known = true;
        self.last_updated = Some(now);
        changed
    }

    /// Returns true on the known -> unknown transition only.
    pub fn mark_unknown(&mut self) -> bool {
        let was_known = self.known;
        self.known = false;
        was_known
    }

    pub fn report(&self) -> Option<&T> {
        if self.known { self.value.as_ref() } else { None }
    }

    pub fn last_value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_known(&self) -> bool {
        self.known
    }

    pub fn last_updated(&self) -> Option<Timestamp> {
        self.last_updated
    }
}

/// Change to push to the host. `value: None` means "now unknown".
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notification {
    pub attribute: Attribute,
    pub value: Option<TelemetryValue>,
}

impl Notification {
    pub fn is_unknown(&self) -> bool {
        self.value.is_none()
    }
}

/// Point-in-time view of a channel, for displays.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChannelReading {
    pub attribute: Attribute,
    pub value: Option<TelemetryValue>,
    pub age: Option<Duration>,
}

/// The fixed table of output channels, built once at startup.
///
/// Attributes outside the table are accepted and ignored.
#[derive(Clone, Debug, Default)]
pub struct TelemetrySink {
    channels: BTreeMap<Attribute, SensorChannel<TelemetryValue>>,
}

impl TelemetrySink {
    pub fn new(attributes: impl IntoIterator<Item = Attribute>) -> TelemetrySink {
        TelemetrySink {
            channels: attributes
                .into_iter()
                .map(|a| (a, SensorChannel::default()))
                .collect(),
        }
    }

    pub fn with_all_attributes() -> TelemetrySink {
        TelemetrySink::new(Attribute::ALL)
    }

    pub fn update(
        &mut self,
        attribute: Attribute,
        value: TelemetryValue,
        now: Timestamp,
    ) -> Option<Notification> {
        let channel = self.channels.get_mut(&attribute)?;
        if channel.update(value.clone(), now) {
            Some(Notification {
                attribute,
                value: Some(value),
            })
        } else {
            None
        }
    }

    pub fn mark_unknown(&mut self, attribute: Attribute) -> Option<Notification> {
        let channel = self.channels.get_mut(&attribute)?;
        channel.mark_unknown().then_some(Notification {
            attribute,
            value: None,
        })
    }

    pub fn mark_all_unknown(&mut self) -> Vec<Notification> {
        self.channels
            .iter_mut()
            .filter_map(|(attribute, channel)| {
                channel.mark_unknown().then_some(Notification {
                    attribute: *attribute,
                    value: None,
                })
            })
            .collect()
    }

    pub fn channel(&self, attribute: Attribute) -> Option<&SensorChannel<TelemetryValue>> {
        self.channels.get(&attribute)
    }

    pub fn attributes(&self) -> impl Iterator<Item = Attribute> + '_ {
        self.channels.keys().copied()
    }

    pub fn any_known(&self) -> bool {
        self.channels.values().any(SensorChannel::is_known)
    }

    pub fn readings(&self, now: Timestamp) -> Vec<ChannelReading> {
        self.channels
            .iter()
            .map(|(attribute, channel)| ChannelReading {
                attribute: *attribute,
                value: channel.report().cloned(),
                age: channel
                    .last_updated()
                    .map(|at| now.saturating_duration_since(at)),
            })
            .collect()
    }
}
