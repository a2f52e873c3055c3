//! Relay handshake
//!
//! Every connection declares its role with a typed hello before any audio
//! flows:
//!
//! ```text
//! Client                                        Relay
//!   |                                             |
//!   |---- {"type":"hello","role":..,"version":1} ->|
//!   |                                             |
//!   |<--- {"type":"welcome","connection_id":N,..} -|   role accepted
//!   |            or                               |
//!   |<--- {"type":"reject","reason":..} + Close ---|   anything else
//!   |                                             |
//!   |======= binary audio frames (no envelope) ===|
//! ```
//!
//! There is no fallback role: a missing or unrecognized role is a rejection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HandshakeError;

/// Protocol version spoken by this crate
pub const PROTOCOL_VERSION: u16 = 1;

/// Websocket close code sent with a rejection (policy violation)
pub const CLOSE_CODE_REJECTED: u16 = 1008;

/// Connection role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Supplies audio frames (browser capture)
    Producer,
    /// Receives forwarded audio frames (voice playback)
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => f.write_str("producer"),
            Role::Consumer => f.write_str("consumer"),
        }
    }
}

/// Role declaration sent by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hello {
    pub role: Role,
    pub version: u16,
}

impl Hello {
    /// Hello for the current protocol version
    pub fn new(role: Role) -> Self {
        Self {
            role,
            version: PROTOCOL_VERSION,
        }
    }
}

/// Control messages exchanged as JSON text frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Hello { role: Role, version: u16 },
    Welcome { connection_id: u64, version: u16 },
    Reject { reason: String },
}

impl ControlMessage {
    /// Parse a control message from a text frame
    pub fn parse(text: &str) -> Result<Self, HandshakeError> {
        serde_json::from_str(text).map_err(|e| HandshakeError::Malformed(e.to_string()))
    }

    /// Encode as a JSON string for a text frame
    pub fn to_json(&self) -> String {
        // Serializing these variants cannot fail: no maps with non-string keys
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn welcome(connection_id: u64) -> Self {
        ControlMessage::Welcome {
            connection_id,
            version: PROTOCOL_VERSION,
        }
    }

    pub fn reject(reason: impl fmt::Display) -> Self {
        ControlMessage::Reject {
            reason: reason.to_string(),
        }
    }
}

impl From<Hello> for ControlMessage {
    fn from(hello: Hello) -> Self {
        ControlMessage::Hello {
            role: hello.role,
            version: hello.version,
        }
    }
}

/// Validate the first text frame received by the relay
///
/// Returns the declared hello if it is well formed and speaks
/// [`PROTOCOL_VERSION`].
pub fn accept_hello(text: &str) -> Result<Hello, HandshakeError> {
    match ControlMessage::parse(text)? {
        ControlMessage::Hello { role, version } => {
            if version != PROTOCOL_VERSION {
                return Err(HandshakeError::UnsupportedVersion(version));
            }
            Ok(Hello { role, version })
        }
        _ => Err(HandshakeError::ExpectedHello),
    }
}

/// Interpret the relay's answer to our hello
///
/// Returns the connection id assigned by the relay.
pub fn accept_reply(text: &str) -> Result<u64, HandshakeError> {
    match ControlMessage::parse(text)? {
        ControlMessage::Welcome {
            connection_id,
            version,
        } => {
            if version != PROTOCOL_VERSION {
                return Err(HandshakeError::UnsupportedVersion(version));
            }
            Ok(connection_id)
        }
        ControlMessage::Reject { reason } => Err(HandshakeError::Rejected(reason)),
        ControlMessage::Hello { .. } => Err(HandshakeError::Malformed(
            "unexpected hello from relay".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_consumer_hello() {
        let hello = accept_hello(r#"{"type":"hello","role":"consumer","version":1}"#).unwrap();
        assert_eq!(hello.role, Role::Consumer);
        assert_eq!(hello.version, PROTOCOL_VERSION);
    }

    #[test]
    fn test_accept_producer_hello() {
        let hello = accept_hello(r#"{"type":"hello","role":"producer","version":1}"#).unwrap();
        assert_eq!(hello.role, Role::Producer);
    }

    #[test]
    fn test_unknown_role_rejected() {
        // Unknown roles must never fall back to producer
        let result = accept_hello(r#"{"type":"hello","role":"listener","version":1}"#);
        assert!(matches!(result, Err(HandshakeError::Malformed(_))));
    }

    #[test]
    fn test_missing_role_rejected() {
        let result = accept_hello(r#"{"type":"hello","version":1}"#);
        assert!(matches!(result, Err(HandshakeError::Malformed(_))));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let result = accept_hello(r#"{"type":"hello","role":"consumer","version":7}"#);
        assert_eq!(result, Err(HandshakeError::UnsupportedVersion(7)));
    }

    #[test]
    fn test_non_hello_first_message() {
        let result = accept_hello(&ControlMessage::welcome(3).to_json());
        assert_eq!(result, Err(HandshakeError::ExpectedHello));
    }

    #[test]
    fn test_hello_wire_format() {
        let json = ControlMessage::from(Hello::new(Role::Consumer)).to_json();
        assert_eq!(json, r#"{"type":"hello","role":"consumer","version":1}"#);
    }

    #[test]
    fn test_accept_reply() {
        assert_eq!(accept_reply(&ControlMessage::welcome(42).to_json()), Ok(42));

        let rejected = accept_reply(&ControlMessage::reject("nope").to_json());
        assert_eq!(rejected, Err(HandshakeError::Rejected("nope".into())));
    }
}
