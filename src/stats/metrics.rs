//! Statistics and metrics for the relay and the stream adapter
//!
//! Counters are plain atomics bumped on the hot path; readers take a
//! [`RelayStatsSnapshot`] / [`AdapterStatsSnapshot`] copy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Relay-wide counters
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    connections_accepted: AtomicU64,
    connections_rejected: AtomicU64,
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    frames_forwarded: AtomicU64,
    frames_dropped: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayStatsSnapshot {
    /// Connections that completed the handshake
    pub connections_accepted: u64,
    /// Connections refused during the handshake or by the connection limit
    pub connections_rejected: u64,
    /// Binary frames received from producers
    pub frames_received: u64,
    /// Payload bytes received from producers
    pub bytes_received: u64,
    /// Frame copies queued to consumers
    pub frames_forwarded: u64,
    /// Frame copies dropped because a consumer queue was full
    pub frames_dropped: u64,
    /// Seconds since the relay started
    pub uptime_secs: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connections_accepted: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            frames_forwarded: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    pub fn record_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_fanout(&self, forwarded: usize, dropped: usize) {
        self.frames_forwarded
            .fetch_add(forwarded as u64, Ordering::Relaxed);
        self.frames_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
    }

    /// Time since the relay started
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_forwarded: self.frames_forwarded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream adapter counters
#[derive(Debug, Default)]
pub struct AdapterStats {
    frames_pushed: AtomicU64,
    frames_dropped: AtomicU64,
    bytes_read: AtomicU64,
}

/// Point-in-time copy of [`AdapterStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdapterStatsSnapshot {
    /// Frames accepted into the queue
    pub frames_pushed: u64,
    /// Frames discarded by the overflow policy
    pub frames_dropped: u64,
    /// Bytes handed to the reader
    pub bytes_read: u64,
}

impl AdapterStats {
    pub fn record_pushed(&self) {
        self.frames_pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read(&self, bytes: usize) {
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AdapterStatsSnapshot {
        AdapterStatsSnapshot {
            frames_pushed: self.frames_pushed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_stats_new() {
        let snapshot = RelayStats::new().snapshot();
        assert_eq!(snapshot.connections_accepted, 0);
        assert_eq!(snapshot.frames_received, 0);
        assert_eq!(snapshot.frames_forwarded, 0);
        assert_eq!(snapshot.frames_dropped, 0);
    }

    #[test]
    fn test_relay_stats_counts() {
        let stats = RelayStats::new();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_rejected();
        stats.record_received(3);
        stats.record_received(2);
        stats.record_fanout(4, 1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connections_accepted, 2);
        assert_eq!(snapshot.connections_rejected, 1);
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.bytes_received, 5);
        assert_eq!(snapshot.frames_forwarded, 4);
        assert_eq!(snapshot.frames_dropped, 1);
    }

    #[test]
    fn test_relay_snapshot_serializes() {
        let json = serde_json::to_value(RelayStats::new().snapshot()).unwrap();
        assert_eq!(json["frames_forwarded"], 0);
        assert!(json.get("uptime_secs").is_some());
    }

    #[test]
    fn test_adapter_stats() {
        let stats = AdapterStats::default();
        stats.record_pushed();
        stats.record_pushed();
        stats.record_dropped();
        stats.record_read(640);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_pushed, 2);
        assert_eq!(snapshot.frames_dropped, 1);
        assert_eq!(snapshot.bytes_read, 640);
    }
}
