//! Stream adapter
//!
//! Turns frames pushed by the consumer connector into a continuous byte
//! source a pull-based decoder can read from.
//!
//! ```text
//!  ConsumerConnector ──push()──► [ bounded queue ] ──poll_read()──► PlaybackSink
//!                                   │
//!                        OverflowPolicy when full:
//!                        DropOldest | DropNewest | Block
//! ```

pub mod adapter;
pub mod config;

pub use adapter::{AdapterStatsHandle, AudioReader, FrameWriter, StreamAdapter};
pub use config::{AdapterConfig, OverflowPolicy};
