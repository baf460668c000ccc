use crate::error::ConfigError;

const VIN_LENGTH: usize = 17;

/// The vehicle this monitor is bound to. Fixed for the monitor's lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VehicleIdentity {
    vin: String,
    ble_name: Option<String>,
}

impl VehicleIdentity {
    pub fn new(vin: &str) -> Result<VehicleIdentity, ConfigError> {
        let vin = vin.trim();
        if vin.len() != VIN_LENGTH || !vin.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::InvalidVin(vin.to_string()));
        }
        Ok(VehicleIdentity {
            vin: vin.to_ascii_uppercase(),
            ble_name: None,
        })
    }

    /// Advertised local name to look for when scanning, if known.
    #[must_use]
    pub fn with_ble_name(mut self, name: impl Into<String>) -> VehicleIdentity {
        self.ble_name = Some(name.into());
        self
    }

    pub fn vin(&self) -> &str {
        &self.vin
    }

    pub fn ble_name(&self) -> Option<&str> {
        self.ble_name.as_deref()
    }
}

impl std::fmt::Display for VehicleIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.ble_name {
            Some(name) => write!(f, "{} ({name})", self.vin),
            None => write!(f, "{}", self.vin),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::error::ConfigError;

    use super::VehicleIdentity;

    #[test]
    fn accepts_and_normalises_vin() {
        let identity = VehicleIdentity::new(" 5yj3e1ea7kf000001 ").unwrap();
        assert_eq!(identity.vin(), "5YJ3E1EA7KF000001");
        assert_eq!(identity.ble_name(), None);
        assert_eq!(format!("{identity}"), "5YJ3E1EA7KF000001");
    }

    #[test]
    fn rejects_malformed_vin() {
        for vin in ["", "5YJ3E1EA7KF00000", "5YJ3E1EA7KF000001X", "5YJ3E1EA7KF-00001"] {
            assert!(matches!(
                VehicleIdentity::new(vin),
                Err(ConfigError::InvalidVin(_))
            ));
        }
    }

    #[test]
    fn carries_ble_name() {
        let identity = VehicleIdentity::new("5YJ3E1EA7KF000001")
            .unwrap()
            .with_ble_name("S1a2b3c4d5e6f7a8bC");
        assert_eq!(identity.ble_name(), Some("S1a2b3c4d5e6f7a8bC"));
        assert_eq!(
            format!("{identity}"),
            "5YJ3E1EA7KF000001 (S1a2b3c4d5e6f7a8bC)"
        );
    }
}
