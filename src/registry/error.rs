//! Registry error types

use super::connection::ConnectionId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A connection with this id is already tracked
    #[error("connection already registered: {0}")]
    DuplicateConnection(ConnectionId),
    /// The registry has been shut down and accepts no new connections
    #[error("registry is shutting down")]
    ShuttingDown,
}
