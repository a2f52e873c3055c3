//! Per-socket relay session
//!
//! Drives one websocket from handshake to close:
//!
//! ```text
//!  upgrade ──► hello? ──► register ──► welcome ──┬─► reader loop (this task)
//!     │          │                               │     producer: broadcast
//!     │          └─► reject + Close              │     consumer: ignore input
//!     │                                          └─► writer task
//!     │                                                frames_rx → Binary
//!     └──────────────────────────── close ──► unregister
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit};

use super::listener::RelayShared;
use crate::error::HandshakeError;
use crate::protocol::handshake::{accept_hello, CLOSE_CODE_REJECTED};
use crate::protocol::{ControlMessage, Hello, Role};
use crate::registry::{AudioFrame, Connection, ConnectionId, ConnectionState, StateCell};

/// Close code sent when the relay closes a connection (going away)
const CLOSE_CODE_GOING_AWAY: u16 = 1001;

/// Consecutive transport errors tolerated before the stream is treated as gone
const MAX_CONSECUTIVE_ERRORS: u32 = 8;

/// How long the writer gets to flush its close frame
const WRITER_GRACE: Duration = Duration::from_secs(2);

/// Serve one upgraded websocket until it closes
pub(super) async fn run(
    mut socket: WebSocket,
    shared: Arc<RelayShared>,
    peer_addr: SocketAddr,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let _live = shared.sessions.enter();

    let hello = match tokio::time::timeout(shared.config.handshake_timeout, read_hello(&mut socket))
        .await
        .unwrap_or(Err(HandshakeError::Timeout))
    {
        Ok(hello) => hello,
        Err(e) => {
            shared.registry.stats().record_rejected();
            tracing::warn!(peer = %peer_addr, error = %e, "Handshake rejected");
            if e != HandshakeError::Closed {
                reject(&mut socket, &e).await;
            }
            return;
        }
    };

    let id = shared.next_connection_id();
    let (connection, link) = Connection::new(
        id,
        hello.role,
        Some(peer_addr),
        shared.config.consumer_queue_capacity,
    );

    if let Err(e) = shared.registry.register(connection).await {
        shared.registry.stats().record_rejected();
        tracing::warn!(connection_id = %id, error = %e, "Registration refused");
        reject(&mut socket, &e).await;
        return;
    }
    shared.registry.stats().record_accepted();

    let welcome = ControlMessage::welcome(id.0).to_json();
    if let Err(e) = socket.send(Message::Text(welcome)).await {
        tracing::warn!(connection_id = %id, error = %e, "Failed to send welcome");
        link.state.advance(ConnectionState::Closed);
        shared.registry.unregister(id).await;
        return;
    }

    tracing::debug!(connection_id = %id, role = %hello.role, peer = %peer_addr, "Connection open");

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_loop(id, sink, link.frames_rx, link.close_rx.clone()));

    read_loop(
        id,
        hello.role,
        stream,
        &shared,
        &link.state,
        link.close_rx,
    )
    .await;

    link.state.advance(ConnectionState::Closed);
    // Dropping the registry entry closes the frame queue, which ends the writer
    shared.registry.unregister(id).await;

    match tokio::time::timeout(WRITER_GRACE, writer).await {
        Ok(Err(e)) => tracing::error!(connection_id = %id, error = %e, "Writer task failed"),
        Err(_) => tracing::debug!(connection_id = %id, "Writer did not finish in time"),
        Ok(Ok(())) => {}
    }

    tracing::debug!(connection_id = %id, "Connection closed");
}

/// Wait for the client's hello, skipping control frames
async fn read_hello(socket: &mut WebSocket) -> Result<Hello, HandshakeError> {
    loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => return accept_hello(&text),
            Some(Ok(Message::Binary(_))) => return Err(HandshakeError::ExpectedHello),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => return Err(HandshakeError::Closed),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Transport error during handshake");
                return Err(HandshakeError::Closed);
            }
        }
    }
}

/// Tell the peer why it is being turned away, then close
async fn reject(socket: &mut WebSocket, reason: &impl std::fmt::Display) {
    let reply = ControlMessage::reject(reason).to_json();
    let _ = socket.send(Message::Text(reply)).await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_CODE_REJECTED,
            reason: "handshake rejected".into(),
        })))
        .await;
}

async fn read_loop(
    id: ConnectionId,
    role: Role,
    mut stream: SplitStream<WebSocket>,
    shared: &RelayShared,
    state: &StateCell,
    mut close_rx: watch::Receiver<bool>,
) {
    let mut consecutive_errors = 0u32;

    loop {
        let message = tokio::select! {
            _ = close_rx.changed() => {
                tracing::debug!(connection_id = %id, "Close requested by relay");
                return;
            }
            message = stream.next() => message,
        };

        match message {
            Some(Ok(Message::Binary(data))) => {
                consecutive_errors = 0;
                match role {
                    Role::Producer => {
                        shared.registry.stats().record_received(data.len());
                        let frame = AudioFrame::from_producer(id, data);
                        let outcome = shared.registry.broadcast(&frame).await;
                        tracing::trace!(
                            connection_id = %id,
                            bytes = frame.len(),
                            delivered = outcome.delivered,
                            "Frame forwarded"
                        );
                    }
                    Role::Consumer => {
                        tracing::debug!(connection_id = %id, "Ignoring binary message from consumer");
                    }
                }
            }
            Some(Ok(Message::Text(_))) => {
                consecutive_errors = 0;
                tracing::debug!(connection_id = %id, "Ignoring text message after handshake");
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                consecutive_errors = 0;
            }
            Some(Ok(Message::Close(frame))) => {
                state.advance(ConnectionState::Closing);
                tracing::debug!(
                    connection_id = %id,
                    code = frame.as_ref().map(|f| f.code),
                    "Close frame received"
                );
                return;
            }
            Some(Err(e)) => {
                // Transport errors do not remove the connection; its close does
                consecutive_errors += 1;
                tracing::warn!(connection_id = %id, error = %e, "Transport error");
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    return;
                }
            }
            None => {
                tracing::debug!(connection_id = %id, "Connection dropped without close frame");
                return;
            }
        }
    }
}

async fn write_loop(
    id: ConnectionId,
    mut sink: SplitSink<WebSocket, Message>,
    mut frames_rx: mpsc::Receiver<bytes::Bytes>,
    mut close_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            changed = close_rx.changed() => {
                if changed.is_ok() && *close_rx.borrow() {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code: CLOSE_CODE_GOING_AWAY,
                            reason: "closed by relay".into(),
                        })))
                        .await;
                }
                break;
            }
            frame = frames_rx.recv() => match frame {
                Some(data) => {
                    if let Err(e) = sink.send(Message::Binary(data.to_vec())).await {
                        tracing::warn!(connection_id = %id, error = %e, "Failed to forward frame");
                    }
                }
                None => break,
            },
        }
    }
}
