//! Connection entry and lifecycle state
//!
//! A [`Connection`] is the registry's half of a relay socket: enough to route
//! frames to it and to ask it to close. The socket task keeps the other half,
//! a [`ConnectionLink`].

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use crate::protocol::Role;

/// Opaque connection identity, never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection lifecycle
///
/// `Connecting → Open → Closing → Closed`, or `Open → Closed` on abrupt
/// termination. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Lock-free state shared between the registry and the socket task
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move forward in the lifecycle; never moves backwards out of `Closed`
    pub fn advance(&self, next: ConnectionState) -> ConnectionState {
        let prev = self.0.fetch_max(next as u8, Ordering::AcqRel);
        ConnectionState::from_u8(prev)
    }

    pub fn is_open(&self) -> bool {
        self.get() == ConnectionState::Open
    }
}

/// Registry entry for a single connection
pub struct Connection {
    /// Connection identity
    pub id: ConnectionId,

    /// Role declared in the handshake
    pub role: Role,

    /// Remote peer address, if known
    pub peer_addr: Option<SocketAddr>,

    /// When the handshake completed
    pub connected_at: Instant,

    state: Arc<StateCell>,

    /// Outbound frame queue (consumers only drain it)
    pub(super) frames_tx: mpsc::Sender<Bytes>,

    close_tx: watch::Sender<bool>,
}

/// Socket-task side of a connection
pub struct ConnectionLink {
    pub id: ConnectionId,
    pub role: Role,
    /// Shared lifecycle state
    pub state: Arc<StateCell>,
    /// Frames routed to this connection by the registry
    pub frames_rx: mpsc::Receiver<Bytes>,
    /// Flips to `true` when the registry asks the connection to close
    pub close_rx: watch::Receiver<bool>,
}

impl Connection {
    /// Create a connection entry and the link held by its socket task
    ///
    /// `queue_capacity` bounds the outbound frame queue.
    pub fn new(
        id: ConnectionId,
        role: Role,
        peer_addr: Option<SocketAddr>,
        queue_capacity: usize,
    ) -> (Self, ConnectionLink) {
        let (frames_tx, frames_rx) = mpsc::channel(queue_capacity.max(1));
        let (close_tx, close_rx) = watch::channel(false);
        let state = Arc::new(StateCell::new(ConnectionState::Connecting));

        let connection = Self {
            id,
            role,
            peer_addr,
            connected_at: Instant::now(),
            state: Arc::clone(&state),
            frames_tx,
            close_tx,
        };

        let link = ConnectionLink {
            id,
            role,
            state,
            frames_rx,
            close_rx,
        };

        (connection, link)
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub(super) fn mark_open(&self) {
        self.state.advance(ConnectionState::Open);
    }

    pub(super) fn mark_closed(&self) {
        self.state.advance(ConnectionState::Closed);
    }

    /// Ask the socket task to close the connection
    pub(super) fn request_close(&self) {
        self.state.advance(ConnectionState::Closing);
        let _ = self.close_tx.send(true);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_advances_forward_only() {
        let cell = StateCell::new(ConnectionState::Connecting);

        cell.advance(ConnectionState::Open);
        assert!(cell.is_open());

        cell.advance(ConnectionState::Closed);
        assert_eq!(cell.get(), ConnectionState::Closed);

        // Closed is terminal
        let prev = cell.advance(ConnectionState::Open);
        assert_eq!(prev, ConnectionState::Closed);
        assert_eq!(cell.get(), ConnectionState::Closed);
    }

    #[test]
    fn test_abrupt_close_skips_closing() {
        let cell = StateCell::new(ConnectionState::Open);
        let prev = cell.advance(ConnectionState::Closed);
        assert_eq!(prev, ConnectionState::Open);
        assert_eq!(cell.get(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_request_close_signals_link() {
        let (conn, mut link) = Connection::new(ConnectionId(1), Role::Consumer, None, 4);
        conn.mark_open();
        assert_eq!(link.state.get(), ConnectionState::Open);

        conn.request_close();
        link.close_rx.changed().await.unwrap();
        assert!(*link.close_rx.borrow());
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(17).to_string(), "#17");
    }
}
