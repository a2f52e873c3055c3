//! Client configuration

use std::time::Duration;

use super::backoff::BackoffPolicy;
use crate::error::{parse_value, Error, Result};

/// Relay client configuration options
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Relay websocket URL (`ws://` or `wss://`)
    pub url: String,

    /// The relay's welcome must arrive within this time
    pub handshake_timeout: Duration,

    /// Delay strategy between reconnect attempts
    pub backoff: BackoffPolicy,

    /// Give up after this many consecutive failed attempts (None = never)
    pub max_attempts: Option<u32>,
}

impl ConnectorConfig {
    /// Create a config for the given relay URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handshake_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
            max_attempts: None,
        }
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set backoff policy
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Cap consecutive failed attempts
    pub fn max_attempts(mut self, max: Option<u32>) -> Self {
        self.max_attempts = max;
        self
    }

    /// Check the URL scheme
    pub fn validate(&self) -> Result<()> {
        if self.url.starts_with("ws://") || self.url.starts_with("wss://") {
            Ok(())
        } else {
            Err(Error::config("RELAY_URL", format!("expected ws:// or wss:// URL, got '{}'", self.url)))
        }
    }

    /// Load from the process environment
    ///
    /// - `RELAY_URL` (required)
    /// - `RECONNECT_BASE_MS` (default 5000)
    /// - `RECONNECT_MULTIPLIER` (default 2.0, 1.0 = fixed delay)
    /// - `RECONNECT_MAX_MS` (default 60000, 0 = no cap)
    /// - `RECONNECT_JITTER` (default 0.25)
    /// - `RECONNECT_MAX_ATTEMPTS` (default unlimited)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("RELAY_URL").ok_or_else(|| Error::config("RELAY_URL", "not set"))?;
        let mut config = Self::new(url);
        config.validate()?;

        if let Some(ms) = lookup("RECONNECT_BASE_MS") {
            config.backoff.base = Duration::from_millis(parse_value("RECONNECT_BASE_MS", &ms)?);
        }
        if let Some(multiplier) = lookup("RECONNECT_MULTIPLIER") {
            let multiplier: f64 = parse_value("RECONNECT_MULTIPLIER", &multiplier)?;
            if multiplier.is_nan() || multiplier < 1.0 {
                return Err(Error::config("RECONNECT_MULTIPLIER", "must be >= 1.0"));
            }
            config.backoff.multiplier = multiplier;
        }
        if let Some(ms) = lookup("RECONNECT_MAX_MS") {
            let ms: u64 = parse_value("RECONNECT_MAX_MS", &ms)?;
            config.backoff.max_delay = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(jitter) = lookup("RECONNECT_JITTER") {
            let jitter: f64 = parse_value("RECONNECT_JITTER", &jitter)?;
            if !(0.0..=1.0).contains(&jitter) {
                return Err(Error::config("RECONNECT_JITTER", "must be within 0.0..=1.0"));
            }
            config.backoff.jitter = jitter;
        }
        if let Some(max) = lookup("RECONNECT_MAX_ATTEMPTS") {
            config.max_attempts = Some(parse_value("RECONNECT_MAX_ATTEMPTS", &max)?);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults() {
        let config = ConnectorConfig::new("ws://localhost:8080");
        assert_eq!(config.url, "ws://localhost:8080");
        assert_eq!(config.backoff, BackoffPolicy::default());
        assert!(config.max_attempts.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_scheme() {
        assert!(ConnectorConfig::new("wss://relay.example.com").validate().is_ok());
        assert!(ConnectorConfig::new("http://relay.example.com").validate().is_err());
    }

    #[test]
    fn test_from_lookup_requires_url() {
        let result = ConnectorConfig::from_lookup(|_| None);
        match result {
            Err(Error::Config { key, .. }) => assert_eq!(key, "RELAY_URL"),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_lookup_backoff() {
        let config = ConnectorConfig::from_lookup(|key| match key {
            "RELAY_URL" => Some("ws://127.0.0.1:9000/".into()),
            "RECONNECT_BASE_MS" => Some("250".into()),
            "RECONNECT_MULTIPLIER" => Some("1".into()),
            "RECONNECT_MAX_MS" => Some("0".into()),
            "RECONNECT_JITTER" => Some("0".into()),
            "RECONNECT_MAX_ATTEMPTS" => Some("3".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.backoff, BackoffPolicy::fixed(Duration::from_millis(250)));
        assert_eq!(config.max_attempts, Some(3));
    }

    #[test]
    fn test_from_lookup_rejects_bad_jitter() {
        let result = ConnectorConfig::from_lookup(|key| match key {
            "RELAY_URL" => Some("ws://127.0.0.1:9000/".into()),
            "RECONNECT_JITTER" => Some("2.5".into()),
            _ => None,
        });
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
