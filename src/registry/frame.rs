//! Audio frame types for relay routing

use bytes::Bytes;

use super::connection::ConnectionId;

/// Where a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameSource {
    /// A producer connection on this relay
    Connection(ConnectionId),
    /// Received from the relay; producer identity is not forwarded
    Relay,
}

/// One chunk of encoded audio as delivered by the transport
///
/// No sequence number, timestamp or envelope. Cheap to clone due to `Bytes`
/// reference counting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub source: FrameSource,
    pub data: Bytes,
}

impl AudioFrame {
    pub fn new(source: FrameSource, data: impl Into<Bytes>) -> Self {
        Self {
            source,
            data: data.into(),
        }
    }

    /// Frame received from a producer connection
    pub fn from_producer(id: ConnectionId, data: impl Into<Bytes>) -> Self {
        Self::new(FrameSource::Connection(id), data)
    }

    /// Frame received by a consumer from the relay
    pub fn from_relay(data: impl Into<Bytes>) -> Self {
        Self::new(FrameSource::Relay, data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
