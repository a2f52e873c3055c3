//! Bounded frame queue with a push side and an `AsyncRead` pull side

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::Notify;

use super::config::{AdapterConfig, OverflowPolicy};
use crate::error::{Error, Result};
use crate::registry::AudioFrame;
use crate::stats::{AdapterStats, AdapterStatsSnapshot};

struct Queue {
    frames: VecDeque<Bytes>,
    /// Remainder of a frame the reader only partially consumed
    current: Option<Bytes>,
    reader_waker: Option<Waker>,
    writer_closed: bool,
    reader_closed: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    /// Signalled whenever the reader frees a slot or goes away
    space: Notify,
    config: AdapterConfig,
    stats: AdapterStats,
}

impl Shared {
    fn wake_reader(&self, waker: Option<Waker>) {
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Pop the next chunk for the reader, freeing a slot if it came off the queue
    fn take_chunk(&self, queue: &mut Queue) -> Option<Bytes> {
        if let Some(current) = queue.current.take() {
            return Some(current);
        }
        let chunk = queue.frames.pop_front()?;
        self.space.notify_one();
        Some(chunk)
    }
}

/// Converts pushed frames into a continuous byte source
///
/// One adapter per pipeline; it is split into a [`FrameWriter`] for the
/// connector and an [`AudioReader`] for the playback sink.
///
/// # Example
/// ```
/// use tokio::io::AsyncReadExt;
/// use voice_relay::registry::AudioFrame;
/// use voice_relay::stream::{AdapterConfig, StreamAdapter};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> voice_relay::Result<()> {
/// let (writer, mut reader) = StreamAdapter::new(AdapterConfig::default()).split();
/// writer.push(AudioFrame::from_relay(vec![1, 2, 3])).await?;
/// drop(writer);
///
/// let mut bytes = Vec::new();
/// reader.read_to_end(&mut bytes).await?;
/// assert_eq!(bytes, [1, 2, 3]);
/// # Ok(())
/// # }
/// ```
pub struct StreamAdapter {
    shared: Arc<Shared>,
}

impl StreamAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    frames: VecDeque::with_capacity(capacity),
                    current: None,
                    reader_waker: None,
                    writer_closed: false,
                    reader_closed: false,
                }),
                space: Notify::new(),
                config: AdapterConfig { capacity, ..config },
                stats: AdapterStats::default(),
            }),
        }
    }

    /// Split into the push and pull halves
    pub fn split(self) -> (FrameWriter, AudioReader) {
        let writer = FrameWriter {
            shared: Arc::clone(&self.shared),
        };
        let reader = AudioReader {
            shared: self.shared,
        };
        (writer, reader)
    }
}

enum PushOutcome {
    /// Frame queued; wake the reader if it was waiting
    Queued(Option<Waker>),
    /// Dropped by `DropNewest`
    Discarded,
    /// Queue full under `Block`
    Full,
}

/// Push side of the adapter, owned by the consumer connector
pub struct FrameWriter {
    shared: Arc<Shared>,
}

impl FrameWriter {
    /// Append a frame in arrival order
    ///
    /// When the queue is full the configured [`OverflowPolicy`] decides:
    /// evict the oldest frame, discard this one, or wait for the reader.
    /// Fails with [`Error::AdapterClosed`] once the reader is gone.
    pub async fn push(&self, frame: AudioFrame) -> Result<()> {
        loop {
            match self.try_push(&frame)? {
                PushOutcome::Queued(waker) => {
                    self.shared.wake_reader(waker);
                    return Ok(());
                }
                PushOutcome::Discarded => return Ok(()),
                PushOutcome::Full => self.shared.space.notified().await,
            }
        }
    }

    fn try_push(&self, frame: &AudioFrame) -> Result<PushOutcome> {
        let shared = &self.shared;
        let capacity = shared.config.capacity;
        let mut queue = shared.queue.lock();

        if queue.reader_closed {
            return Err(Error::AdapterClosed);
        }

        if queue.frames.len() >= capacity {
            match shared.config.overflow {
                OverflowPolicy::DropOldest => {
                    queue.frames.pop_front();
                    shared.stats.record_dropped();
                    tracing::debug!(capacity, "Adapter full, dropped oldest frame");
                }
                OverflowPolicy::DropNewest => {
                    shared.stats.record_dropped();
                    tracing::debug!(
                        capacity,
                        bytes = frame.len(),
                        "Adapter full, dropped incoming frame"
                    );
                    return Ok(PushOutcome::Discarded);
                }
                OverflowPolicy::Block => return Ok(PushOutcome::Full),
            }
        }

        queue.frames.push_back(frame.data.clone());
        shared.stats.record_pushed();
        Ok(PushOutcome::Queued(queue.reader_waker.take()))
    }

    /// Signal end of stream; the reader drains what is queued, then sees EOF
    pub fn close(&self) {
        let waker = {
            let mut queue = self.shared.queue.lock();
            queue.writer_closed = true;
            queue.reader_waker.take()
        };
        self.shared.wake_reader(waker);
    }

    /// Whether the reader half has been dropped
    pub fn is_reader_closed(&self) -> bool {
        self.shared.queue.lock().reader_closed
    }

    pub fn stats(&self) -> AdapterStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Handle for reading stats after the writer moves into a task
    pub fn stats_handle(&self) -> AdapterStatsHandle {
        AdapterStatsHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read-only view of an adapter's counters
#[derive(Clone)]
pub struct AdapterStatsHandle {
    shared: Arc<Shared>,
}

impl AdapterStatsHandle {
    pub fn snapshot(&self) -> AdapterStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Frames currently queued
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().frames.len()
    }
}

/// Pull side of the adapter, handed to the playback sink
///
/// Reads as one continuous byte stream via `AsyncRead`, or frame by frame via
/// [`next_frame`](Self::next_frame) / `Stream`.
pub struct AudioReader {
    shared: Arc<Shared>,
}

impl AudioReader {
    /// Next whole frame (or the rest of a partially read one)
    ///
    /// Returns `None` once the writer is closed and the queue is drained.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        std::future::poll_fn(|cx| self.poll_frame(cx)).await
    }

    fn poll_frame(&self, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        let mut queue = self.shared.queue.lock();

        if let Some(chunk) = self.shared.take_chunk(&mut queue) {
            self.shared.stats.record_read(chunk.len());
            return Poll::Ready(Some(chunk));
        }
        if queue.writer_closed {
            return Poll::Ready(None);
        }

        queue.reader_waker = Some(cx.waker().clone());
        Poll::Pending
    }

    /// Frames currently queued
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().frames.len()
    }

    pub fn stats(&self) -> AdapterStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl AsyncRead for AudioReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let shared = &self.shared;
        let mut queue = shared.queue.lock();
        let mut copied = 0;

        while buf.remaining() > 0 {
            let Some(mut chunk) = shared.take_chunk(&mut queue) else {
                break;
            };

            let n = chunk.len().min(buf.remaining());
            buf.put_slice(&chunk[..n]);
            copied += n;

            if n < chunk.len() {
                queue.current = Some(chunk.split_off(n));
            }
        }

        if copied > 0 {
            shared.stats.record_read(copied);
            return Poll::Ready(Ok(()));
        }
        if queue.writer_closed {
            // EOF
            return Poll::Ready(Ok(()));
        }

        queue.reader_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Stream for AudioReader {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.poll_frame(cx)
    }
}

impl Drop for AudioReader {
    fn drop(&mut self) {
        self.shared.queue.lock().reader_closed = true;
        // Release a writer blocked on space
        self.shared.space.notify_one();
    }
}
