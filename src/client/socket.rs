//! Outbound relay socket with the client half of the handshake

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

use crate::error::{HandshakeError, Result};
use crate::protocol::handshake::accept_reply;
use crate::protocol::{ControlMessage, Hello, Role};
use crate::registry::ConnectionId;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect, declare `role`, and wait for the relay's welcome
pub(crate) async fn open(
    url: &str,
    role: Role,
    handshake_timeout: Duration,
) -> Result<(WsStream, ConnectionId)> {
    // Audio frames are small and latency-bound: disable Nagle
    let (mut ws, _response) = connect_async_with_config(url, None, true).await?;

    let hello = ControlMessage::from(Hello::new(role)).to_json();
    ws.send(Message::Text(hello)).await?;

    let id = match tokio::time::timeout(handshake_timeout, await_welcome(&mut ws)).await {
        Ok(result) => result?,
        Err(_) => return Err(HandshakeError::Timeout.into()),
    };

    Ok((ws, ConnectionId(id)))
}

async fn await_welcome(ws: &mut WsStream) -> Result<u64> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(accept_reply(&text)?),
            Some(Ok(Message::Binary(_))) => {
                return Err(HandshakeError::Malformed("binary frame before welcome".into()).into())
            }
            Some(Ok(Message::Close(_))) | None => return Err(HandshakeError::Closed.into()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}
