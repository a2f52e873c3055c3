//! Sink that copies the stream into any `AsyncWrite`
//!
//! Used by the `voice-consumer` binary to write to stdout or a file, where a
//! downstream player or recorder takes over.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::sink::{AudioEncoding, PlaybackSink, SinkState};
use crate::error::{Error, Result};
use crate::stream::AudioReader;

/// Playback sink backed by an async writer
///
/// Ready as soon as it is created. `play` spawns a copy task that moves the
/// state to `Playing`, then `Stopped` at end of stream or `Errored` on a
/// write failure.
pub struct WriterSink<W> {
    writer: Option<W>,
    state: Arc<watch::Sender<SinkState>>,
    task: Option<JoinHandle<()>>,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(writer: W) -> Self {
        let (state, _) = watch::channel(SinkState::Ready);
        Self {
            writer: Some(writer),
            state: Arc::new(state),
            task: None,
        }
    }

    /// Whether the copy task has finished
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(false, |task| task.is_finished())
    }
}

impl<W> PlaybackSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn state(&self) -> watch::Receiver<SinkState> {
        self.state.subscribe()
    }

    fn play(&mut self, mut source: AudioReader, encoding: AudioEncoding) -> Result<()> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| Error::Playback("writer sink already playing".into()))?;

        let state = Arc::clone(&self.state);
        state.send_replace(SinkState::Playing);
        tracing::info!(container = %encoding.container, "Playback started");

        self.task = Some(tokio::spawn(async move {
            let copied = async {
                let bytes = tokio::io::copy(&mut source, &mut writer).await?;
                writer.flush().await?;
                Ok::<_, std::io::Error>(bytes)
            }
            .await;

            match copied {
                Ok(bytes) => {
                    tracing::info!(bytes, "Playback finished");
                    state.send_replace(SinkState::Stopped);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Playback failed");
                    state.send_replace(SinkState::Errored(e.to_string()));
                }
            }
        }));

        Ok(())
    }

    fn take_playback_task(&mut self) -> Option<JoinHandle<()>> {
        self.task.take()
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::registry::AudioFrame;
    use crate::stream::{AdapterConfig, StreamAdapter};

    async fn wait_terminal(rx: &mut watch::Receiver<SinkState>) -> SinkState {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.is_terminal()))
            .await
            .unwrap()
            .unwrap()
            .clone()
    }

    #[tokio::test]
    async fn test_copies_stream_then_stops() {
        let (writer, reader) = StreamAdapter::new(AdapterConfig::default()).split();
        let (out, mut sink_side) = tokio::io::duplex(64);

        let mut sink = WriterSink::new(out);
        let mut state = sink.state();
        assert_eq!(*state.borrow(), SinkState::Ready);

        writer.push(AudioFrame::from_relay(Bytes::from_static(&[0x1a, 0x45]))).await.unwrap();
        writer.push(AudioFrame::from_relay(Bytes::from_static(&[0xdf, 0xa3]))).await.unwrap();
        drop(writer);

        sink.play(reader, AudioEncoding::default()).unwrap();

        let mut received = Vec::new();
        sink_side.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, [0x1a, 0x45, 0xdf, 0xa3]);

        assert_eq!(wait_terminal(&mut state).await, SinkState::Stopped);
    }

    #[tokio::test]
    async fn test_write_failure_reports_errored() {
        let (writer, reader) = StreamAdapter::new(AdapterConfig::default()).split();
        let out = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "output gone"))
            .build();

        let mut sink = WriterSink::new(out);
        let mut state = sink.state();

        writer.push(AudioFrame::from_relay(vec![1, 2, 3])).await.unwrap();
        sink.play(reader, AudioEncoding::default()).unwrap();

        match wait_terminal(&mut state).await {
            SinkState::Errored(reason) => assert!(reason.contains("output gone")),
            other => panic!("expected errored, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_play_twice_fails() {
        let (_writer, reader) = StreamAdapter::new(AdapterConfig::default()).split();
        let (_w2, second) = StreamAdapter::new(AdapterConfig::default()).split();
        let mut sink = WriterSink::new(tokio::io::sink());

        sink.play(reader, AudioEncoding::default()).unwrap();
        let result = sink.play(second, AudioEncoding::default());
        assert!(matches!(result, Err(Error::Playback(_))));
    }
}
