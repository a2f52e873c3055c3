//! Error types
//!
//! One crate-level [`Error`] with sub-enums for the handshake and the
//! connection registry.

use std::io;

use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket or file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Websocket transport failure on the client side
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Relay handshake failed or was rejected
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Connection registry rejected an operation
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Invalid configuration value
    #[error("invalid configuration for {key}: {message}")]
    Config { key: String, message: String },

    /// Playback sink failed to start or run
    #[error("playback error: {0}")]
    Playback(String),

    /// Stream adapter's reader side is gone
    #[error("stream adapter closed")]
    AdapterClosed,

    /// Operation requires an open connection
    #[error("not connected")]
    NotConnected,

    /// A pipeline task panicked or was cancelled
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn config(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Config {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

/// Parse a configuration value, naming the key on failure
pub(crate) fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e| Error::config(key, e))
}

/// Relay handshake errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// Hello message could not be parsed (unknown role, missing fields, bad JSON)
    #[error("malformed hello: {0}")]
    Malformed(String),

    /// First message was not a text hello
    #[error("expected hello text message")]
    ExpectedHello,

    /// Peer speaks a different protocol version
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),

    /// No hello/welcome within the handshake timeout
    #[error("handshake timed out")]
    Timeout,

    /// Relay refused the connection
    #[error("rejected by relay: {0}")]
    Rejected(String),

    /// Connection closed before the handshake completed
    #[error("connection closed during handshake")]
    Closed,
}
