//! Relay server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{parse_value, Error, Result};

/// Default relay port
pub const DEFAULT_PORT: u16 = 8080;

/// Relay server configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// The hello must arrive within this time after the upgrade
    pub handshake_timeout: Duration,

    /// Frames buffered per consumer before new frames are dropped for it
    pub consumer_queue_capacity: usize,

    /// Largest accepted websocket message in bytes
    pub max_message_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            handshake_timeout: Duration::from_secs(10),
            consumer_queue_capacity: 256,
            max_message_size: 1024 * 1024, // 1MB
        }
    }
}

impl RelayConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set per-consumer queue capacity (at least 1)
    pub fn consumer_queue_capacity(mut self, capacity: usize) -> Self {
        self.consumer_queue_capacity = capacity.max(1);
        self
    }

    /// Set maximum websocket message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Load from the process environment
    ///
    /// - `RELAY_BIND_ADDRESS` (default `0.0.0.0:8080`)
    /// - `RELAY_MAX_CONNECTIONS` (default 0, unlimited)
    /// - `RELAY_HANDSHAKE_TIMEOUT_MS` (default 10000)
    /// - `RELAY_CONSUMER_QUEUE` (default 256)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("RELAY_BIND_ADDRESS") {
            config.bind_addr = parse_value("RELAY_BIND_ADDRESS", &addr)?;
        }
        if let Some(max) = lookup("RELAY_MAX_CONNECTIONS") {
            config.max_connections = parse_value("RELAY_MAX_CONNECTIONS", &max)?;
        }
        if let Some(ms) = lookup("RELAY_HANDSHAKE_TIMEOUT_MS") {
            config.handshake_timeout =
                Duration::from_millis(parse_value("RELAY_HANDSHAKE_TIMEOUT_MS", &ms)?);
        }
        if let Some(capacity) = lookup("RELAY_CONSUMER_QUEUE") {
            let capacity: usize = parse_value("RELAY_CONSUMER_QUEUE", &capacity)?;
            if capacity == 0 {
                return Err(Error::config("RELAY_CONSUMER_QUEUE", "must be at least 1"));
            }
            config.consumer_queue_capacity = capacity;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.consumer_queue_capacity, 256);
        assert_eq!(config.max_message_size, 1024 * 1024);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = RelayConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let config = RelayConfig::default()
            .bind(addr)
            .max_connections(50)
            .handshake_timeout(Duration::from_millis(500))
            .consumer_queue_capacity(0)
            .max_message_size(4096);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.handshake_timeout, Duration::from_millis(500));
        // Capacity is clamped to at least one frame
        assert_eq!(config.consumer_queue_capacity, 1);
        assert_eq!(config.max_message_size, 4096);
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = RelayConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr, RelayConfig::default().bind_addr);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("RELAY_BIND_ADDRESS", "127.0.0.1:7000"),
            ("RELAY_MAX_CONNECTIONS", "12"),
            ("RELAY_HANDSHAKE_TIMEOUT_MS", "250"),
            ("RELAY_CONSUMER_QUEUE", "32"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 7000);
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.handshake_timeout, Duration::from_millis(250));
        assert_eq!(config.consumer_queue_capacity, 32);
    }

    #[test]
    fn test_from_lookup_invalid_value() {
        let result = RelayConfig::from_lookup(lookup(&[("RELAY_MAX_CONNECTIONS", "lots")]));
        match result {
            Err(Error::Config { key, .. }) => assert_eq!(key, "RELAY_MAX_CONNECTIONS"),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_lookup_zero_queue() {
        let result = RelayConfig::from_lookup(lookup(&[("RELAY_CONSUMER_QUEUE", "0")]));
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
