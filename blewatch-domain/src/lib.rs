//! Polling and freshness core for a BLE-connected vehicle.
//!
//! Everything in this crate is synchronous and takes the current [`clock::Timestamp`]
//! explicitly; the transport and the host live in the other workspace crates.

pub mod chrono_extra;
pub mod clock;
pub mod error;
pub mod identity;
pub mod monitor;
pub mod params;
pub mod report;
pub mod scheduler;
pub mod sink;
pub mod staleness;
pub mod telemetry;
pub mod vehicle_state;
