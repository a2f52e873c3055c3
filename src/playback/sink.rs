//! Playback sink contract

use std::fmt;
use std::str::FromStr;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::stream::AudioReader;

/// Lifecycle of a playback sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkState {
    /// Created, not yet attached to an output
    Idle,
    /// Attaching or filling internal buffers
    Buffering,
    /// Able to accept a stream
    Ready,
    Playing,
    Paused,
    /// Finished; terminal
    Stopped,
    /// Failed; terminal
    Errored(String),
}

impl SinkState {
    /// No further transitions follow
    pub fn is_terminal(&self) -> bool {
        matches!(self, SinkState::Stopped | SinkState::Errored(_))
    }
}

impl fmt::Display for SinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkState::Idle => write!(f, "idle"),
            SinkState::Buffering => write!(f, "buffering"),
            SinkState::Ready => write!(f, "ready"),
            SinkState::Playing => write!(f, "playing"),
            SinkState::Paused => write!(f, "paused"),
            SinkState::Stopped => write!(f, "stopped"),
            SinkState::Errored(reason) => write!(f, "errored ({})", reason),
        }
    }
}

/// Container format of the byte stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Container {
    /// What browser `MediaRecorder` emits
    #[default]
    WebM,
    Ogg,
}

impl FromStr for Container {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webm" => Ok(Container::WebM),
            "ogg" => Ok(Container::Ogg),
            other => Err(format!("unknown container '{}', expected webm or ogg", other)),
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Container::WebM => write!(f, "webm"),
            Container::Ogg => write!(f, "ogg"),
        }
    }
}

/// Audio codec inside the container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Codec {
    #[default]
    Opus,
}

/// Declared format of the relayed stream
///
/// The relay forwards bytes verbatim, so this is a hint passed to the sink,
/// not something verified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioEncoding {
    pub container: Container,
    pub codec: Codec,
}

impl AudioEncoding {
    pub fn new(container: Container, codec: Codec) -> Self {
        Self { container, codec }
    }
}

/// Something that plays a continuous audio byte stream
///
/// Implementations publish their state through a watch channel; the pipeline
/// calls [`play`](Self::play) exactly once, after the state reaches
/// [`SinkState::Ready`].
pub trait PlaybackSink: Send + 'static {
    /// Subscribe to state changes
    fn state(&self) -> watch::Receiver<SinkState>;

    /// Start consuming `source`
    ///
    /// Returns once playback has started, not when it ends.
    fn play(&mut self, source: AudioReader, encoding: AudioEncoding) -> Result<()>;

    /// Background task still draining the stream, if the sink runs one
    ///
    /// The pipeline awaits it on shutdown so buffered audio is not cut off.
    fn take_playback_task(&mut self) -> Option<JoinHandle<()>> {
        None
    }
}
