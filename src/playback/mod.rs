//! Playback side of the consumer pipeline
//!
//! ```text
//!   ConsumerConnector ──push──► StreamAdapter ──AudioReader──► PlaybackSink
//!                                                   ▲
//!                              gate: play() once ───┘ sink state == Ready
//! ```
//!
//! [`VoicePipeline`] wires the three together. The sink decides when it is
//! ready; frames that arrive earlier wait in the adapter.

pub mod pipeline;
pub mod sink;
pub mod writer;

pub use pipeline::{PipelineConfig, PipelineHandle, VoicePipeline};
pub use sink::{AudioEncoding, Codec, Container, PlaybackSink, SinkState};
pub use writer::WriterSink;
