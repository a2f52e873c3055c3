//! Relay producer
//!
//! Sends audio frames to the relay for fan-out to every consumer.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use super::config::ConnectorConfig;
use super::socket::{self, WsStream};
use crate::error::{Error, Result};
use crate::protocol::Role;
use crate::registry::ConnectionId;

/// Producer connection to the relay
///
/// Unlike the consumer connector this does not reconnect; a failed send is
/// returned to the caller.
///
/// # Example
/// ```no_run
/// use voice_relay::client::RelayProducer;
///
/// # async fn example() -> voice_relay::Result<()> {
/// let mut producer = RelayProducer::connect("ws://localhost:8080/").await?;
/// producer.send_frame(vec![0x4f, 0x67, 0x67, 0x53]).await?;
/// producer.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct RelayProducer {
    ws: Option<WsStream>,
    connection_id: ConnectionId,
}

impl RelayProducer {
    /// Connect with default settings
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(&ConnectorConfig::new(url)).await
    }

    /// Connect using the URL and handshake timeout from `config`
    pub async fn connect_with(config: &ConnectorConfig) -> Result<Self> {
        config.validate()?;
        let (ws, connection_id) =
            socket::open(&config.url, Role::Producer, config.handshake_timeout).await?;

        tracing::info!(connection_id = %connection_id, url = %config.url, "Producer connected");

        Ok(Self {
            ws: Some(ws),
            connection_id,
        })
    }

    /// Identifier the relay assigned in its welcome
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn is_connected(&self) -> bool {
        self.ws.is_some()
    }

    /// Send one audio frame as a binary message
    pub async fn send_frame(&mut self, data: impl Into<Bytes>) -> Result<()> {
        let ws = self.ws.as_mut().ok_or(Error::NotConnected)?;
        let data: Bytes = data.into();

        if let Err(e) = ws.send(Message::Binary(data.to_vec())).await {
            self.ws = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Close the connection, waiting briefly for the relay's close reply
    pub async fn close(mut self) -> Result<()> {
        let Some(mut ws) = self.ws.take() else {
            return Ok(());
        };

        ws.close(None).await?;
        // Drain until the relay acknowledges the close
        while let Some(message) = ws.next().await {
            if message.is_err() {
                break;
            }
        }

        tracing::debug!(connection_id = %self.connection_id, "Producer closed");
        Ok(())
    }
}
