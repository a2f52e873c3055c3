//! Relay clients
//!
//! - [`ConsumerConnector`]: persistent consumer link with backoff reconnect,
//!   feeding a stream adapter
//! - [`RelayProducer`]: one-shot producer link for sending frames

pub mod backoff;
pub mod config;
pub mod connector;
pub mod producer;
pub(crate) mod socket;

pub use backoff::BackoffPolicy;
pub use config::ConnectorConfig;
pub use connector::{ConnectorExit, ConsumerConnector, ReconnectState, StopHandle};
pub use producer::RelayProducer;
