//! Relay and adapter statistics

pub mod metrics;

pub use metrics::{AdapterStats, AdapterStatsSnapshot, RelayStats, RelayStatsSnapshot};
