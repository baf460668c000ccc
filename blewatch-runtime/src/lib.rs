//! Drives a [`blewatch_domain::monitor::VehicleMonitor`] from a tokio task.

pub mod agent;
pub mod clock;
pub mod config;
pub mod snapshot;
