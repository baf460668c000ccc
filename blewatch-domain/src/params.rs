use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tick of the host polling component when nothing else is configured.
pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_secs(60);

/// Disconnection time after which all sensors are reported unknown, when unset.
pub const DEFAULT_BLE_DISCONNECTED_MIN_TIME: Duration = Duration::from_secs(300);

/// Polling durations as they arrive from configuration, in seconds.
///
/// Kept signed so that negative values can be reported instead of wrapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPollingParameters {
    pub post_wake_poll_time: Option<i64>,
    pub poll_data_period: Option<i64>,
    pub poll_asleep_period: Option<i64>,
    pub poll_charging_period: Option<i64>,
    pub ble_disconnected_min_time: Option<i64>,
}

/// Validated polling configuration. Immutable once loaded.
///
/// Unset or zero poll periods resolve to the base interval. The disconnection
/// threshold resolves to [`DEFAULT_BLE_DISCONNECTED_MIN_TIME`] when unset and to
/// `None` (staleness forcing disabled) when explicitly zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingParameters {
    base_interval: Duration,
    post_wake_poll_time: Duration,
    poll_data_period: Duration,
    poll_asleep_period: Duration,
    poll_charging_period: Duration,
    ble_disconnected_min_time: Option<Duration>,
}

impl PollingParameters {
    pub fn load(
        raw: &RawPollingParameters,
        base_interval: Duration,
    ) -> Result<PollingParameters, ConfigError> {
        if base_interval.is_zero() {
            return Err(ConfigError::ZeroBaseInterval);
        }
        let or_base = |d: Option<Duration>| match d {
            Some(d) if !d.is_zero() => d,
            _ => base_interval,
        };

        let post_wake_poll_time = seconds("post_wake_poll_time", raw.post_wake_poll_time)?;
        let poll_data_period = seconds("poll_data_period", raw.poll_data_period)?;
        let poll_asleep_period = seconds("poll_asleep_period", raw.poll_asleep_period)?;
        let poll_charging_period = seconds("poll_charging_period", raw.poll_charging_period)?;
        let ble_disconnected_min_time =
            match seconds("ble_disconnected_min_time", raw.ble_disconnected_min_time)? {
                None => Some(DEFAULT_BLE_DISCONNECTED_MIN_TIME),
                Some(d) if d.is_zero() => None,
                Some(d) => Some(d),
            };

        Ok(PollingParameters {
            base_interval,
            post_wake_poll_time: or_base(post_wake_poll_time),
            poll_data_period: or_base(poll_data_period),
            poll_asleep_period: or_base(poll_asleep_period),
            poll_charging_period: or_base(poll_charging_period),
            ble_disconnected_min_time,
        })
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    pub fn post_wake_poll_time(&self) -> Duration {
        self.post_wake_poll_time
    }

    pub fn poll_data_period(&self) -> Duration {
        self.poll_data_period
    }

    pub fn poll_asleep_period(&self) -> Duration {
        self.poll_asleep_period
    }

    pub fn poll_charging_period(&self) -> Duration {
        self.poll_charging_period
    }

    /// `None` when staleness forcing is disabled.
    pub fn ble_disconnected_min_time(&self) -> Option<Duration> {
        self.ble_disconnected_min_time
    }
}

impl Default for PollingParameters {
    fn default() -> Self {
        PollingParameters {
            base_interval: DEFAULT_BASE_INTERVAL,
            post_wake_poll_time: DEFAULT_BASE_INTERVAL,
            poll_data_period: DEFAULT_BASE_INTERVAL,
            poll_asleep_period: DEFAULT_BASE_INTERVAL,
            poll_charging_period: DEFAULT_BASE_INTERVAL,
            ble_disconnected_min_time: Some(DEFAULT_BLE_DISCONNECTED_MIN_TIME),
        }
    }
}

fn seconds(name: &'static str, value: Option<i64>) -> Result<Option<Duration>, ConfigError> {
    match value {
        None => Ok(None),
        Some(value) if value < 0 => Err(ConfigError::Negative { name, value }),
        Some(value) if value > i64::from(u16::MAX) => Err(ConfigError::OutOfRange {
            name,
            value,
            max: u16::MAX,
        }),
        Some(value) => Ok(Some(Duration::from_secs(value.unsigned_abs()))),
    }
}
