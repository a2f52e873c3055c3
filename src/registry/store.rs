//! Connection registry implementation
//!
//! The central registry that tracks every open connection by role and routes
//! producer frames to consumers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::RwLock;

use super::connection::{Connection, ConnectionId};
use super::error::RegistryError;
use super::frame::AudioFrame;
use crate::protocol::Role;
use crate::stats::RelayStats;

/// The two disjoint role sets
///
/// Both live behind a single lock so membership checks and moves between
/// them are atomic.
#[derive(Default)]
struct RoleSets {
    producers: HashMap<ConnectionId, Connection>,
    consumers: HashMap<ConnectionId, Connection>,
    shutting_down: bool,
}

impl RoleSets {
    fn set_mut(&mut self, role: Role) -> &mut HashMap<ConnectionId, Connection> {
        match role {
            Role::Producer => &mut self.producers,
            Role::Consumer => &mut self.consumers,
        }
    }

    fn contains(&self, id: ConnectionId) -> bool {
        self.producers.contains_key(&id) || self.consumers.contains_key(&id)
    }
}

/// Result of one fan-out call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Consumers the frame was queued to
    pub delivered: usize,
    /// Consumers skipped because they were not open
    pub skipped: usize,
    /// Consumers whose queue was full
    pub dropped: usize,
}

/// Registry of live relay connections, partitioned by role
///
/// Thread-safe via a single `RwLock`. Broadcasting only needs the read lock,
/// so producers never serialize behind each other; connect and close take the
/// write lock.
pub struct ClientRegistry {
    sets: RwLock<RoleSets>,
    stats: Arc<RelayStats>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::with_stats(Arc::new(RelayStats::new()))
    }

    /// Create an empty registry reporting into `stats`
    pub fn with_stats(stats: Arc<RelayStats>) -> Self {
        Self {
            sets: RwLock::new(RoleSets::default()),
            stats,
        }
    }

    /// Relay counters
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Register a connection whose handshake succeeded
    ///
    /// The connection is marked open and becomes a broadcast target (if it is
    /// a consumer) as soon as this returns.
    pub async fn register(&self, connection: Connection) -> Result<(), RegistryError> {
        let mut sets = self.sets.write().await;

        if sets.shutting_down {
            return Err(RegistryError::ShuttingDown);
        }
        if sets.contains(connection.id) {
            return Err(RegistryError::DuplicateConnection(connection.id));
        }

        connection.mark_open();
        let (id, role) = (connection.id, connection.role);
        sets.set_mut(role).insert(id, connection);

        tracing::info!(
            connection_id = %id,
            role = %role,
            producers = sets.producers.len(),
            consumers = sets.consumers.len(),
            "Connection registered"
        );

        Ok(())
    }

    /// Remove a connection after its close event
    ///
    /// Returns the removed entry, or `None` if it was already gone (for
    /// example after [`close_all`](Self::close_all)).
    pub async fn unregister(&self, id: ConnectionId) -> Option<Connection> {
        let mut sets = self.sets.write().await;

        let removed = sets
            .producers
            .remove(&id)
            .or_else(|| sets.consumers.remove(&id));

        if let Some(ref connection) = removed {
            connection.mark_closed();
            tracing::info!(
                connection_id = %id,
                role = %connection.role,
                producers = sets.producers.len(),
                consumers = sets.consumers.len(),
                "Connection unregistered"
            );
        }

        removed
    }

    /// Forward a producer frame to every open consumer
    ///
    /// Runs to completion without yielding once the read lock is held.
    /// Consumers that are not open are skipped silently; a consumer whose
    /// queue is full misses this frame. With no consumers this is a no-op.
    pub async fn broadcast(&self, frame: &AudioFrame) -> BroadcastOutcome {
        let sets = self.sets.read().await;
        let mut outcome = BroadcastOutcome::default();

        for connection in sets.consumers.values() {
            if !connection.is_open() {
                outcome.skipped += 1;
                continue;
            }

            match connection.frames_tx.try_send(frame.data.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    tracing::debug!(
                        connection_id = %connection.id,
                        bytes = frame.len(),
                        "Consumer queue full, frame dropped"
                    );
                }
                // Socket task already gone; its close event will unregister it
                Err(TrySendError::Closed(_)) => outcome.skipped += 1,
            }
        }

        self.stats.record_fanout(outcome.delivered, outcome.dropped);
        outcome
    }

    /// Close every tracked connection and clear both sets
    ///
    /// The registry refuses new registrations afterwards. Returns the number
    /// of connections that were asked to close.
    pub async fn close_all(&self) -> usize {
        let mut sets = self.sets.write().await;
        sets.shutting_down = true;

        let producers = std::mem::take(&mut sets.producers);
        let consumers = std::mem::take(&mut sets.consumers);
        let count = producers.len() + consumers.len();

        for connection in producers.values().chain(consumers.values()) {
            connection.request_close();
        }

        tracing::info!(closed = count, "All connections closed");
        count
    }

    /// Ask one connection to close without removing it
    ///
    /// The entry stays registered (and is skipped by broadcast) until its
    /// socket task reports the close. Returns `false` for unknown ids.
    pub async fn close_connection(&self, id: ConnectionId) -> bool {
        let sets = self.sets.read().await;
        let connection = sets.producers.get(&id).or_else(|| sets.consumers.get(&id));

        match connection {
            Some(connection) => {
                connection.request_close();
                tracing::info!(connection_id = %id, role = %connection.role, "Connection close requested");
                true
            }
            None => false,
        }
    }

    /// Ids of registered consumers, in ascending order
    pub async fn consumer_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.sets.read().await.consumers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of registered producers
    pub async fn producer_count(&self) -> usize {
        self.sets.read().await.producers.len()
    }

    /// Number of registered consumers
    pub async fn consumer_count(&self) -> usize {
        self.sets.read().await.consumers.len()
    }

    /// Role of a registered connection
    pub async fn role_of(&self, id: ConnectionId) -> Option<Role> {
        let sets = self.sets.read().await;
        if sets.producers.contains_key(&id) {
            Some(Role::Producer)
        } else if sets.consumers.contains_key(&id) {
            Some(Role::Consumer)
        } else {
            None
        }
    }

    /// Whether [`close_all`](Self::close_all) has run
    pub async fn is_shutting_down(&self) -> bool {
        self.sets.read().await.shutting_down
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
