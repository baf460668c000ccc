use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use blewatch_domain::{
    error::ConfigError,
    identity::VehicleIdentity,
    monitor::VehicleMonitor,
    params::{DEFAULT_BASE_INTERVAL, PollingParameters, RawPollingParameters},
    sink::TelemetrySink,
    telemetry::{Attribute, ChargingState},
    vehicle_state::ChargingPredicate,
};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("no vehicle identifier configured")]
    MissingVin,
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Agent configuration as written in the TOML file. Durations are in seconds.
///
/// ```toml
/// vin = "5YJ3E1EA7KF000001"
/// ble_name = "S1a87a5a75f3df858C"
/// base_interval = 60
/// charging_states = ["Starting", "Charging"]
///
/// [polling]
/// post_wake_poll_time = 300
/// poll_data_period = 60
/// poll_asleep_period = 600
/// poll_charging_period = 10
/// ble_disconnected_min_time = 300
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub vin: Option<String>,
    pub ble_name: Option<String>,
    pub base_interval: Option<u64>,
    pub charging_states: Option<Vec<ChargingState>>,
    /// Channels to publish; all of them when unset.
    pub attributes: Option<Vec<Attribute>>,
    pub polling: RawPollingParameters,
}

impl AgentConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<AgentConfig, LoadError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Command-line values win over the file.
    #[must_use]
    pub fn with_overrides(mut self, vin: Option<String>, ble_name: Option<String>) -> AgentConfig {
        if vin.is_some() {
            self.vin = vin;
        }
        if ble_name.is_some() {
            self.ble_name = ble_name;
        }
        self
    }

    /// Validates everything. Nothing runs with a configuration that fails here.
    pub fn resolve(&self) -> Result<AgentSettings, LoadError> {
        let vin = self.vin.as_deref().ok_or(LoadError::MissingVin)?;
        let mut identity = VehicleIdentity::new(vin)?;
        if let Some(name) = &self.ble_name {
            identity = identity.with_ble_name(name.clone());
        }

        let base_interval = self
            .base_interval
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_BASE_INTERVAL);
        let params = PollingParameters::load(&self.polling, base_interval)?;

        let predicate = match &self.charging_states {
            Some(states) => ChargingPredicate::new(states.iter().copied()),
            None => ChargingPredicate::default(),
        };
        let attributes = match &self.attributes {
            Some(attributes) => attributes.clone(),
            None => Attribute::ALL.to_vec(),
        };

        Ok(AgentSettings {
            identity,
            params,
            predicate,
            attributes,
        })
    }
}

/// Validated configuration, ready to build a monitor from.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub identity: VehicleIdentity,
    pub params: PollingParameters,
    pub predicate: ChargingPredicate,
    pub attributes: Vec<Attribute>,
}

impl AgentSettings {
    pub fn monitor(&self) -> VehicleMonitor {
        VehicleMonitor::new(
            self.identity.clone(),
            self.params,
            self.predicate.clone(),
            TelemetrySink::new(self.attributes.iter().copied()),
        )
    }

    /// How often the agent ticks the monitor: a tenth of the base interval, within 1s..=base.
    pub fn tick_period(&self) -> Duration {
        let base = self.params.base_interval();
        (base / 10).max(Duration::from_secs(1)).min(base)
    }
}
