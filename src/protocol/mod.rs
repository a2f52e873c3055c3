//! Relay wire protocol
//!
//! Control messages are JSON text frames; audio travels as raw binary frames
//! with no envelope.

pub mod handshake;

pub use handshake::{ControlMessage, Hello, Role, PROTOCOL_VERSION};
