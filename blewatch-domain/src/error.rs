use thiserror::Error;

/// Rejected configuration. Raised while loading, before any state machine runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must not be negative (got {value})")]
    Negative { name: &'static str, value: i64 },

    #[error("{name} must be at most {max} seconds (got {value})")]
    OutOfRange {
        name: &'static str,
        value: i64,
        max: u16,
    },

    #[error("base interval must be greater than zero")]
    ZeroBaseInterval,

    #[error("invalid vehicle identifier {0:?}: expected 17 alphanumeric characters")]
    InvalidVin(String),

    #[error("unknown charging state {0:?}")]
    UnknownChargingState(String),

    #[error("unknown shift state {0:?}")]
    UnknownShiftState(String),

    #[error("unknown attribute {0:?}")]
    UnknownAttribute(String),
}
