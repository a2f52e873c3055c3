//! voice-relay: websocket audio relay and consumer pipeline
//!
//! Streams live audio captured in a browser to voice-chat playback through an
//! intermediary relay:
//!
//! ```text
//!  browser capture ──► RelayServer ──► fan-out ──► ConsumerConnector
//!    (producer)        (registry)                       │
//!                                                       ▼
//!                                  PlaybackSink ◄── StreamAdapter
//! ```
//!
//! - [`server::RelayServer`] accepts websocket connections, classifies them
//!   with a typed handshake and forwards producer frames to every open consumer.
//! - [`client::ConsumerConnector`] keeps one consumer connection alive with
//!   backoff-driven reconnects and an explicit stop signal.
//! - [`stream::StreamAdapter`] turns pushed frames into an `AsyncRead` byte
//!   source with a configurable overflow policy.
//! - [`playback::VoicePipeline`] wires the three together and only starts
//!   playback once the sink reports ready.

pub mod client;
pub mod error;
pub mod playback;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod signal;
pub mod stats;
pub mod stream;

pub use client::{
    BackoffPolicy, ConnectorConfig, ConnectorExit, ConsumerConnector, RelayProducer, StopHandle,
};
pub use error::{Error, Result};
pub use playback::{PipelineConfig, PlaybackSink, SinkState, VoicePipeline, WriterSink};
pub use protocol::Role;
pub use registry::{AudioFrame, ClientRegistry, ConnectionId};
pub use server::{RelayConfig, RelayServer};
pub use signal::shutdown_signal;
pub use stream::{AdapterConfig, OverflowPolicy, StreamAdapter};
