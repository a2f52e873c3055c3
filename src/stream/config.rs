//! Stream adapter configuration

use std::fmt;
use std::str::FromStr;

use crate::error::{parse_value, Error, Result};

/// Policy for handling queue overflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest queued frame to make room (real-time audio)
    #[default]
    DropOldest,

    /// Discard the incoming frame, keep the queue intact
    DropNewest,

    /// Wait for the reader to free a slot; pauses reading from the relay
    Block,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::DropOldest => f.write_str("drop-oldest"),
            OverflowPolicy::DropNewest => f.write_str("drop-newest"),
            OverflowPolicy::Block => f.write_str("block"),
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop-oldest" | "drop_oldest" | "oldest" => Ok(OverflowPolicy::DropOldest),
            "drop-newest" | "drop_newest" | "newest" => Ok(OverflowPolicy::DropNewest),
            "block" | "backpressure" => Ok(OverflowPolicy::Block),
            other => Err(format!("unknown overflow policy '{}'", other)),
        }
    }
}

/// Stream adapter configuration options
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Maximum frames held before the overflow policy applies
    pub capacity: usize,

    /// What to do when the queue is full
    pub overflow: OverflowPolicy,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            // ~1s of 20ms Opus packets
            capacity: 50,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

impl AdapterConfig {
    /// Set queue capacity in frames (at least 1)
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Set the overflow policy
    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    /// Load `ADAPTER_CAPACITY` / `ADAPTER_OVERFLOW` from a key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(capacity) = lookup("ADAPTER_CAPACITY") {
            let capacity: usize = parse_value("ADAPTER_CAPACITY", &capacity)?;
            if capacity == 0 {
                return Err(Error::config("ADAPTER_CAPACITY", "must be at least 1"));
            }
            config.capacity = capacity;
        }
        if let Some(policy) = lookup("ADAPTER_OVERFLOW") {
            config.overflow = parse_value("ADAPTER_OVERFLOW", &policy)?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AdapterConfig::default();
        assert_eq!(config.capacity, 50);
        assert_eq!(config.overflow, OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("drop-oldest".parse(), Ok(OverflowPolicy::DropOldest));
        assert_eq!("DROP_NEWEST".parse(), Ok(OverflowPolicy::DropNewest));
        assert_eq!("backpressure".parse(), Ok(OverflowPolicy::Block));
        assert!("sometimes".parse::<OverflowPolicy>().is_err());
    }

    #[test]
    fn test_policy_display_parses_back() {
        for policy in [OverflowPolicy::DropOldest, OverflowPolicy::DropNewest, OverflowPolicy::Block] {
            assert_eq!(policy.to_string().parse(), Ok(policy));
        }
    }

    #[test]
    fn test_builder_clamps_capacity() {
        let config = AdapterConfig::default().capacity(0).overflow(OverflowPolicy::Block);
        assert_eq!(config.capacity, 1);
        assert_eq!(config.overflow, OverflowPolicy::Block);
    }

    #[test]
    fn test_from_lookup() {
        let config = AdapterConfig::from_lookup(|key| match key {
            "ADAPTER_CAPACITY" => Some("8".into()),
            "ADAPTER_OVERFLOW" => Some("drop-newest".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.capacity, 8);
        assert_eq!(config.overflow, OverflowPolicy::DropNewest);

        let invalid = AdapterConfig::from_lookup(|key| match key {
            "ADAPTER_OVERFLOW" => Some("never".into()),
            _ => None,
        });
        assert!(matches!(invalid, Err(Error::Config { .. })));
    }
}
