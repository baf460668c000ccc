use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One monitored vehicle property.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Asleep,
    Unlocked,
    UserPresent,
    ChargeFlapOpen,
    ChargerConnected,
    ShiftState,
    BatteryLevel,
    Odometer,
    ChargeCurrent,
    ChargePower,
    MaxSoc,
    MaxAmps,
    BatteryRange,
    ChargingState,
    ClimateOn,
    InsideTemp,
    OutsideTemp,
    BootOpen,
    FrunkOpen,
}

impl Attribute {
    pub const ALL: [Attribute; 19] = [
        Attribute::Asleep,
        Attribute::Unlocked,
        Attribute::UserPresent,
        Attribute::ChargeFlapOpen,
        Attribute::ChargerConnected,
        Attribute::ShiftState,
        Attribute::BatteryLevel,
        Attribute::Odometer,
        Attribute::ChargeCurrent,
        Attribute::ChargePower,
        Attribute::MaxSoc,
        Attribute::MaxAmps,
        Attribute::BatteryRange,
        Attribute::ChargingState,
        Attribute::ClimateOn,
        Attribute::InsideTemp,
        Attribute::OutsideTemp,
        Attribute::BootOpen,
        Attribute::FrunkOpen,
    ];

    /// Stable identifier, as used in configuration and serialized reports.
    pub fn key(&self) -> &'static str {
        use Attribute::*;
        match self {
            Asleep => "asleep",
            Unlocked => "unlocked",
            UserPresent => "user_present",
            ChargeFlapOpen => "charge_flap_open",
            ChargerConnected => "charger_connected",
            ShiftState => "shift_state",
            BatteryLevel => "battery_level",
            Odometer => "odometer",
            ChargeCurrent => "charge_current",
            ChargePower => "charge_power",
            MaxSoc => "max_soc",
            MaxAmps => "max_amps",
            BatteryRange => "battery_range",
            ChargingState => "charging_state",
            ClimateOn => "climate_on",
            InsideTemp => "inside_temp",
            OutsideTemp => "outside_temp",
            BootOpen => "boot_open",
            FrunkOpen => "frunk_open",
        }
    }

    /// Human-facing name, as shown on dashboards.
    pub fn display_name(&self) -> &'static str {
        use Attribute::*;
        match self {
            Asleep => "Asleep",
            Unlocked => "Doors",
            UserPresent => "User Present",
            ChargeFlapOpen => "Charge Flap",
            ChargerConnected => "Charger",
            ShiftState => "Shift State",
            BatteryLevel => "Battery",
            Odometer => "Odometer",
            ChargeCurrent => "Charge Current",
            ChargePower => "Charger Power",
            MaxSoc => "Charging Limit",
            MaxAmps => "Charging Amps",
            BatteryRange => "Range",
            ChargingState => "Charging",
            ClimateOn => "Climate",
            InsideTemp => "Inside Temp",
            OutsideTemp => "Outside Temp",
            BootOpen => "Boot",
            FrunkOpen => "Frunk",
        }
    }

    pub fn unit(&self) -> Option<&'static str> {
        use Attribute::*;
        match self {
            BatteryLevel | MaxSoc => Some("%"),
            ChargePower => Some("kW"),
            ChargeCurrent | MaxAmps => Some("A"),
            Odometer | BatteryRange => Some("mi"),
            InsideTemp | OutsideTemp => Some("°C"),
            _ => None,
        }
    }

    /// `value` with this attribute's unit appended, if it has one.
    pub fn format_value(&self, value: &TelemetryValue) -> String {
        match (self.unit(), value) {
            (Some(unit), TelemetryValue::Number(_)) => format!("{value} {unit}"),
            _ => value.to_string(),
        }
    }
}

impl FromStr for Attribute {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::ALL
            .into_iter()
            .find(|a| a.key() == s)
            .ok_or_else(|| ConfigError::UnknownAttribute(s.to_string()))
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Charging substate as reported by the vehicle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChargingState {
    Unknown,
    Disconnected,
    NoPower,
    Starting,
    Charging,
    Complete,
    Stopped,
    Calibrating,
}

impl ChargingState {
    const ALL: [ChargingState; 8] = [
        ChargingState::Unknown,
        ChargingState::Disconnected,
        ChargingState::NoPower,
        ChargingState::Starting,
        ChargingState::Charging,
        ChargingState::Complete,
        ChargingState::Stopped,
        ChargingState::Calibrating,
    ];

    pub fn label(&self) -> &'static str {
        use ChargingState::*;
        match self {
            Unknown => "Unknown",
            Disconnected => "Disconnected",
            NoPower => "No Power",
            Starting => "Starting",
            Charging => "Charging",
            Complete => "Complete",
            Stopped => "Stopped",
            Calibrating => "Calibrating",
        }
    }
}

/// Accepts "No Power", "no_power" and "NoPower" alike.
impl FromStr for ChargingState {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = squash(s);
        ChargingState::ALL
            .into_iter()
            .find(|c| squash(c.label()) == wanted)
            .ok_or_else(|| ConfigError::UnknownChargingState(s.to_string()))
    }
}

impl TryFrom<String> for ChargingState {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChargingState> for String {
    fn from(value: ChargingState) -> Self {
        value.label().to_string()
    }
}

impl std::fmt::Display for ChargingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShiftState {
    Invalid,
    P,
    R,
    N,
    D,
    Sna,
}

impl ShiftState {
    const ALL: [ShiftState; 6] = [
        ShiftState::Invalid,
        ShiftState::P,
        ShiftState::R,
        ShiftState::N,
        ShiftState::D,
        ShiftState::Sna,
    ];

    pub fn label(&self) -> &'static str {
        use ShiftState::*;
        match self {
            Invalid => "Invalid",
            P => "P",
            R => "R",
            N => "N",
            D => "D",
            Sna => "SNA",
        }
    }
}

impl FromStr for ShiftState {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShiftState::ALL
            .into_iter()
            .find(|state| state.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownShiftState(s.to_string()))
    }
}

impl std::fmt::Display for ShiftState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl TelemetryValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TelemetryValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            TelemetryValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TelemetryValue::Text(t) => Some(t),
            _ => None,
        }
    }
}

impl From<bool> for TelemetryValue {
    fn from(value: bool) -> Self {
        TelemetryValue::Bool(value)
    }
}

impl From<f64> for TelemetryValue {
    fn from(value: f64) -> Self {
        TelemetryValue::Number(value)
    }
}

impl From<&str> for TelemetryValue {
    fn from(value: &str) -> Self {
        TelemetryValue::Text(value.to_string())
    }
}

impl From<String> for TelemetryValue {
    fn from(value: String) -> Self {
        TelemetryValue::Text(value)
    }
}

impl From<ChargingState> for TelemetryValue {
    fn from(value: ChargingState) -> Self {
        TelemetryValue::Text(value.label().to_string())
    }
}

impl From<ShiftState> for TelemetryValue {
    fn from(value: ShiftState) -> Self {
        TelemetryValue::Text(value.label().to_string())
    }
}

impl std::fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryValue::Bool(true) => write!(f, "on"),
            TelemetryValue::Bool(false) => write!(f, "off"),
            TelemetryValue::Number(n) if n.fract() == 0.0 => write!(f, "{n:.0}"),
            TelemetryValue::Number(n) => write!(f, "{n:.1}"),
            TelemetryValue::Text(t) => write!(f, "{t}"),
        }
    }
}

/// A decoded attribute update delivered by the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub attribute: Attribute,
    pub value: TelemetryValue,
}

impl TelemetryEvent {
    #[must_use]
    pub fn new(attribute: Attribute, value: impl Into<TelemetryValue>) -> TelemetryEvent {
        TelemetryEvent {
            attribute,
            value: value.into(),
        }
    }

    /// The decoded sleep flag, if this event carries one.
    pub fn is_asleep(&self) -> Option<bool> {
        match self.attribute {
            Attribute::Asleep => self.value.as_bool(),
            _ => None,
        }
    }

    pub fn is_unlocked(&self) -> Option<bool> {
        match self.attribute {
            Attribute::Unlocked => self.value.as_bool(),
            _ => None,
        }
    }

    /// The decoded charging substate, if this event carries a recognisable one.
    pub fn charging_state(&self) -> Option<ChargingState> {
        match self.attribute {
            Attribute::ChargingState => self.value.as_text().and_then(|t| t.parse().ok()),
            _ => None,
        }
    }
}
