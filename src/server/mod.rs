//! Relay broadcast server
//!
//! Accepts websocket connections, classifies each one with the typed
//! handshake, and forwards every producer frame to all open consumers.

pub mod config;
pub mod listener;
mod session;

pub use config::RelayConfig;
pub use listener::RelayServer;
