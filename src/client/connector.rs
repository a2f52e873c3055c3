//! Consumer connector
//!
//! Keeps one consumer connection to the relay alive and feeds every received
//! frame into a [`FrameWriter`].
//!
//! ```text
//!        ┌──────────┐  open   ┌──────────┐  close/error  ┌───────────┐
//!  ─────►│ connect  │────────►│  pump    │──────────────►│ schedule  │
//!        └──────────┘         └──────────┘               │ 1 retry   │
//!             ▲                    │ stop                └─────┬─────┘
//!             │                    ▼                           │ delay
//!             │               [ Stopped ]◄──── stop ───────────┤
//!             └────────────────────────────────────────────────┘
//! ```
//!
//! The stop signal is checked before scheduling a retry, interrupts the
//! delay, is checked again before the attempt runs, and closes the live
//! connection.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

use super::config::ConnectorConfig;
use super::socket::{self, WsStream};
use crate::protocol::Role;
use crate::registry::AudioFrame;
use crate::stream::FrameWriter;

/// Consecutive transport errors tolerated before treating the link as closed
const MAX_CONSECUTIVE_ERRORS: u32 = 8;

/// Raises the connector's stop signal
///
/// Cloneable; dropping every handle does not stop the connector.
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Suppress any pending or future reconnect and close the live connection
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`stop`](Self::stop) has been called
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Receiving side of the stop signal
struct StopSignal {
    // Held so the channel never closes while the connector runs
    _tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    async fn raised(&mut self) {
        // The sender is kept alive by `_tx`, so this only returns once raised
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Reconnect bookkeeping, mutated only by the connector
#[derive(Debug, Default)]
pub struct ReconnectState {
    attempts: AtomicU32,
    connects: AtomicU64,
    scheduled: AtomicU64,
    connected: AtomicBool,
}

impl ReconnectState {
    /// Consecutive failed attempts since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Successful opens over the connector's lifetime
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Acquire)
    }

    /// Reconnect attempts scheduled over the connector's lifetime
    pub fn reconnects_scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::Acquire)
    }

    /// Whether a relay connection is currently open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn on_open(&self) {
        self.attempts.store(0, Ordering::Release);
        self.connects.fetch_add(1, Ordering::AcqRel);
        self.connected.store(true, Ordering::Release);
    }

    fn on_close(&self) {
        self.connected.store(false, Ordering::Release);
    }

    fn on_schedule(&self) -> u32 {
        self.scheduled.fetch_add(1, Ordering::AcqRel);
        self.attempts.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Why [`ConsumerConnector::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorExit {
    /// Stop signal raised
    Stopped,
    /// `max_attempts` configured and exhausted
    AttemptsExhausted,
    /// The adapter's reader side was dropped; nobody consumes frames
    ReaderClosed,
}

enum LinkEnd {
    Closed,
    Stopped,
    ReaderClosed,
}

/// Persistent consumer connection to the relay
///
/// # Example
/// ```no_run
/// use voice_relay::client::{ConnectorConfig, ConsumerConnector};
/// use voice_relay::stream::{AdapterConfig, StreamAdapter};
///
/// # async fn example() {
/// let (writer, reader) = StreamAdapter::new(AdapterConfig::default()).split();
/// let (connector, stop) = ConsumerConnector::new(ConnectorConfig::new("ws://localhost:8080/"));
///
/// let task = tokio::spawn(connector.run(writer));
/// // ... hand `reader` to a playback sink ...
/// stop.stop();
/// let _ = task.await;
/// # drop(reader);
/// # }
/// ```
pub struct ConsumerConnector {
    config: ConnectorConfig,
    state: Arc<ReconnectState>,
    stop: StopSignal,
}

impl ConsumerConnector {
    /// Create a connector and the handle that stops it
    pub fn new(config: ConnectorConfig) -> (Self, StopHandle) {
        let (tx, rx) = watch::channel(false);
        let tx = Arc::new(tx);

        let connector = Self {
            config,
            state: Arc::new(ReconnectState::default()),
            stop: StopSignal {
                _tx: Arc::clone(&tx),
                rx,
            },
        };

        (connector, StopHandle { tx })
    }

    /// Shared reconnect state for observation
    pub fn state(&self) -> Arc<ReconnectState> {
        Arc::clone(&self.state)
    }

    /// Connect and keep reconnecting until stopped
    ///
    /// Connection failures are logged and retried, never returned.
    pub async fn run(mut self, frames: FrameWriter) -> ConnectorExit {
        loop {
            if self.stop.is_raised() {
                return self.exit(ConnectorExit::Stopped);
            }

            let opened = tokio::select! {
                _ = self.stop.raised() => return self.exit(ConnectorExit::Stopped),
                opened = socket::open(&self.config.url, Role::Consumer, self.config.handshake_timeout) => opened,
            };

            match opened {
                Ok((ws, id)) => {
                    self.state.on_open();
                    tracing::info!(connection_id = %id, url = %self.config.url, "Connected to relay");

                    let end = self.pump(ws, &frames).await;
                    self.state.on_close();

                    match end {
                        LinkEnd::Closed => {
                            tracing::info!(connection_id = %id, "Relay connection closed");
                        }
                        LinkEnd::Stopped => return self.exit(ConnectorExit::Stopped),
                        LinkEnd::ReaderClosed => return self.exit(ConnectorExit::ReaderClosed),
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.config.url, error = %e, "Failed to connect to relay");
                }
            }

            if self.stop.is_raised() {
                return self.exit(ConnectorExit::Stopped);
            }

            if let Some(max) = self.config.max_attempts {
                if self.state.attempts() >= max {
                    return self.exit(ConnectorExit::AttemptsExhausted);
                }
            }
            let attempt = self.state.on_schedule();

            let delay = self.config.backoff.delay(attempt);
            tracing::info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnect scheduled"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.stop.raised() => return self.exit(ConnectorExit::Stopped),
            }
        }
    }

    /// Forward relay frames into the adapter until the link ends
    async fn pump(&mut self, mut ws: WsStream, frames: &FrameWriter) -> LinkEnd {
        let mut consecutive_errors = 0u32;

        loop {
            let message = tokio::select! {
                _ = self.stop.raised() => {
                    let _ = ws.close(None).await;
                    return LinkEnd::Stopped;
                }
                message = ws.next() => message,
            };

            match message {
                Some(Ok(Message::Binary(data))) => {
                    consecutive_errors = 0;
                    // Under a blocking overflow policy this waits, which pauses reads from the relay
                    let pushed = tokio::select! {
                        _ = self.stop.raised() => {
                            let _ = ws.close(None).await;
                            return LinkEnd::Stopped;
                        }
                        pushed = frames.push(AudioFrame::from_relay(data)) => pushed,
                    };
                    if pushed.is_err() {
                        let _ = ws.close(None).await;
                        return LinkEnd::ReaderClosed;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(
                        code = frame.as_ref().map(|f| u16::from(f.code)),
                        "Close frame from relay"
                    );
                    return LinkEnd::Closed;
                }
                Some(Ok(_)) => consecutive_errors = 0,
                Some(Err(e)) => {
                    consecutive_errors += 1;
                    tracing::warn!(error = %e, "Relay connection error");
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        return LinkEnd::Closed;
                    }
                }
                None => return LinkEnd::Closed,
            }
        }
    }

    fn exit(&self, reason: ConnectorExit) -> ConnectorExit {
        tracing::info!(reason = ?reason, connects = self.state.connects(), "Connector finished");
        reason
    }
}
