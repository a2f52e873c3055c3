//! Connection registry for producer/consumer routing
//!
//! The registry tracks every open relay connection, partitioned by role, and
//! fans producer frames out to the consumer set.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<ClientRegistry>
//!                   ┌──────────────────────────┐
//!                   │ RwLock<RoleSets {        │
//!                   │   producers: {id → conn} │
//!                   │   consumers: {id → conn} │
//!                   │ }>                       │
//!                   └────────────┬─────────────┘
//!                                │
//!        ┌───────────────────────┼───────────────────────┐
//!        │                       │                       │
//!        ▼                       ▼                       ▼
//!   [Producer]              [Consumer]              [Consumer]
//!   socket.recv()           frames_rx.recv()        frames_rx.recv()
//!        │                       │                       │
//!        └──► registry.broadcast()──► try_send() ──► websocket
//! ```
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` is reference counted, so every consumer queue shares the
//! producer's allocation. Fan-out never awaits: each consumer has its own
//! bounded queue and a full queue drops the frame for that consumer only.

pub mod connection;
pub mod error;
pub mod frame;
pub mod store;

pub use connection::{Connection, ConnectionId, ConnectionLink, ConnectionState, StateCell};
pub use error::RegistryError;
pub use frame::{AudioFrame, FrameSource};
pub use store::{BroadcastOutcome, ClientRegistry};
