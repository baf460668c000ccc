use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    sink::Notification,
    telemetry::{Attribute, TelemetryValue},
};

/// A notification stamped with wall-clock time, as handed to history sinks.
///
/// `value: None` records that the attribute became unknown.
#[derive(Serialize, PartialEq, Debug, Clone)]
pub struct SensorReport {
    pub date_time: DateTime<Utc>,
    pub attribute: Attribute,
    pub value: Option<TelemetryValue>,
}

impl SensorReport {
    #[must_use]
    pub fn new(
        date_time: DateTime<Utc>,
        attribute: Attribute,
        value: Option<TelemetryValue>,
    ) -> SensorReport {
        SensorReport {
            date_time,
            attribute,
            value,
        }
    }

    #[must_use]
    pub fn from_notification(date_time: DateTime<Utc>, notification: &Notification) -> SensorReport {
        SensorReport {
            date_time,
            attribute: notification.attribute,
            value: notification.value.clone(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.value.is_none()
    }
}

impl std::fmt::Display for SensorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(value) => write!(
                f,
                "{}: {}",
                self.attribute.display_name(),
                self.attribute.format_value(value)
            ),
            None => write!(f, "{}: unknown", self.attribute.display_name()),
        }
    }
}
