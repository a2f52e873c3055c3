//! Consumer pipeline: connector, adapter and sink under one handle

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::sink::{AudioEncoding, Container, PlaybackSink, SinkState};
use crate::client::{ConnectorConfig, ConnectorExit, ConsumerConnector, ReconnectState, StopHandle};
use crate::error::{parse_value, Result};
use crate::stats::AdapterStatsSnapshot;
use crate::stream::{AdapterConfig, AdapterStatsHandle, AudioReader, StreamAdapter};

/// How long shutdown waits for the sink to write out buffered audio
const PLAYBACK_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed to run a consumer pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub connector: ConnectorConfig,
    pub adapter: AdapterConfig,
    pub encoding: AudioEncoding,
}

impl PipelineConfig {
    pub fn new(connector: ConnectorConfig) -> Self {
        Self {
            connector,
            adapter: AdapterConfig::default(),
            encoding: AudioEncoding::default(),
        }
    }

    /// Set adapter config
    pub fn adapter(mut self, adapter: AdapterConfig) -> Self {
        self.adapter = adapter;
        self
    }

    /// Set declared stream encoding
    pub fn encoding(mut self, encoding: AudioEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Load from the process environment
    ///
    /// Connector and adapter keys as documented on their configs, plus
    /// `AUDIO_CONTAINER` (`webm` or `ogg`, default `webm`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut encoding = AudioEncoding::default();
        if let Some(container) = lookup("AUDIO_CONTAINER") {
            encoding.container = parse_value::<Container>("AUDIO_CONTAINER", &container)?;
        }

        Ok(Self {
            connector: ConnectorConfig::from_lookup(&lookup)?,
            adapter: AdapterConfig::from_lookup(&lookup)?,
            encoding,
        })
    }
}

/// Starts consumer pipelines
pub struct VoicePipeline;

impl VoicePipeline {
    /// Spawn the connector, the sink state observer and the playback gate
    ///
    /// Must be called inside a tokio runtime. Fails only on an invalid
    /// relay URL; connection failures are retried in the background.
    pub fn start<S: PlaybackSink>(config: PipelineConfig, sink: S) -> Result<PipelineHandle> {
        config.connector.validate()?;

        let (writer, reader) = StreamAdapter::new(config.adapter.clone()).split();
        let adapter_stats = writer.stats_handle();

        let (connector, stop) = ConsumerConnector::new(config.connector);
        let connector_state = connector.state();
        let sink_state = sink.state();

        let connector = tokio::spawn(connector.run(writer));
        let observer = tokio::spawn(observe(sink.state(), stop.clone()));
        let gate = tokio::spawn(gate(sink, reader, config.encoding, stop.clone()));

        tracing::info!(
            capacity = config.adapter.capacity,
            overflow = %config.adapter.overflow,
            "Voice pipeline started"
        );

        Ok(PipelineHandle {
            stop,
            connector_state,
            adapter_stats,
            sink_state,
            connector,
            observer,
            gate,
        })
    }
}

/// Wait for the sink to become ready, then start playback exactly once
///
/// The sink is kept alive until the pipeline stops, then given time to
/// drain what the adapter still holds.
async fn gate<S: PlaybackSink>(
    mut sink: S,
    reader: AudioReader,
    encoding: AudioEncoding,
    stop: StopHandle,
) {
    let mut state = sink.state();

    let ready = tokio::select! {
        ready = wait_ready(&mut state) => ready,
        _ = stop.stopped() => false,
    };

    if !ready {
        let current = state.borrow().clone();
        tracing::debug!(state = %current, "Sink never became ready");
        return;
    }

    match sink.play(reader, encoding) {
        Ok(()) => tracing::debug!("Sink accepted stream"),
        Err(e) => tracing::error!(error = %e, "Failed to start playback"),
    }

    stop.stopped().await;

    // The connector drops its writer on stop, so the reader reaches EOF
    if let Some(task) = sink.take_playback_task() {
        match tokio::time::timeout(PLAYBACK_DRAIN_TIMEOUT, task).await {
            Ok(Ok(())) => tracing::debug!("Playback drained"),
            Ok(Err(e)) => tracing::error!(error = %e, "Playback task failed"),
            Err(_) => tracing::warn!("Playback did not drain in time"),
        }
    }
}

/// `true` once the sink reports `Ready`, `false` if it ends first
async fn wait_ready(state: &mut watch::Receiver<SinkState>) -> bool {
    match state
        .wait_for(|s| *s == SinkState::Ready || s.is_terminal())
        .await
    {
        Ok(s) => *s == SinkState::Ready,
        Err(_) => false,
    }
}

/// Log every sink state transition
async fn observe(mut state: watch::Receiver<SinkState>, stop: StopHandle) {
    let mut last = state.borrow_and_update().clone();
    tracing::debug!(state = %last, "Sink state");

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = stop.stopped() => break,
        }

        let next = state.borrow_and_update().clone();
        match next {
            SinkState::Errored(ref reason) => {
                tracing::error!(from = %last, reason = %reason, "Sink errored")
            }
            _ => tracing::info!(from = %last, to = %next, "Sink state changed"),
        }
        last = next;
    }
}

/// Control handle for a running pipeline
pub struct PipelineHandle {
    stop: StopHandle,
    connector_state: Arc<ReconnectState>,
    adapter_stats: AdapterStatsHandle,
    sink_state: watch::Receiver<SinkState>,
    connector: JoinHandle<ConnectorExit>,
    observer: JoinHandle<()>,
    gate: JoinHandle<()>,
}

impl PipelineHandle {
    /// Raise the stop signal; `join` to wait for the tasks to finish
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Reconnect bookkeeping of the connector
    pub fn connector_state(&self) -> Arc<ReconnectState> {
        Arc::clone(&self.connector_state)
    }

    pub fn adapter_stats(&self) -> AdapterStatsSnapshot {
        self.adapter_stats.snapshot()
    }

    /// Frames waiting in the adapter
    pub fn queued_frames(&self) -> usize {
        self.adapter_stats.queued()
    }

    /// Subscribe to the sink's state
    pub fn sink_state(&self) -> watch::Receiver<SinkState> {
        self.sink_state.clone()
    }

    /// Wait for the connector to finish, then tear down the other tasks
    pub async fn join(self) -> Result<ConnectorExit> {
        let exit = self.connector.await;
        // The connector can end without a stop (attempts exhausted, reader gone)
        self.stop.stop();

        for (task, result) in [("gate", self.gate.await), ("observer", self.observer.await)] {
            if let Err(e) = result {
                tracing::error!(task, error = %e, "Pipeline task failed");
            }
        }

        let exit = exit?;
        tracing::info!(exit = ?exit, "Voice pipeline stopped");
        Ok(exit)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::client::BackoffPolicy;
    use crate::stream::OverflowPolicy;

    /// Sink whose state the test drives by hand
    struct ManualSink {
        state: Arc<watch::Sender<SinkState>>,
        plays: Arc<AtomicUsize>,
        source: Option<AudioReader>,
    }

    impl ManualSink {
        fn new(initial: SinkState) -> (Self, Arc<watch::Sender<SinkState>>, Arc<AtomicUsize>) {
            let (tx, _) = watch::channel(initial);
            let tx = Arc::new(tx);
            let plays = Arc::new(AtomicUsize::new(0));
            let sink = Self {
                state: Arc::clone(&tx),
                plays: Arc::clone(&plays),
                source: None,
            };
            (sink, tx, plays)
        }
    }

    impl PlaybackSink for ManualSink {
        fn state(&self) -> watch::Receiver<SinkState> {
            self.state.subscribe()
        }

        fn play(&mut self, source: AudioReader, _encoding: AudioEncoding) -> Result<()> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            self.source = Some(source);
            self.state.send_replace(SinkState::Playing);
            Ok(())
        }
    }

    async fn unreachable_config() -> PipelineConfig {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        PipelineConfig::new(
            ConnectorConfig::new(format!("ws://{}/", addr))
                .backoff(BackoffPolicy::fixed(Duration::from_millis(20))),
        )
    }

    #[tokio::test]
    async fn test_play_waits_for_ready() {
        let (sink, state_tx, plays) = ManualSink::new(SinkState::Buffering);
        let handle = VoicePipeline::start(unreachable_config().await, sink).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(plays.load(Ordering::SeqCst), 0);

        state_tx.send_replace(SinkState::Ready);

        let mut sink_state = handle.sink_state();
        tokio::time::timeout(
            Duration::from_secs(2),
            sink_state.wait_for(|s| *s == SinkState::Playing),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(plays.load(Ordering::SeqCst), 1);

        // Ready again must not trigger a second play
        state_tx.send_replace(SinkState::Ready);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(plays.load(Ordering::SeqCst), 1);

        handle.stop();
        let exit = tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, ConnectorExit::Stopped);
    }

    #[tokio::test]
    async fn test_errored_sink_never_plays() {
        let (sink, state_tx, plays) = ManualSink::new(SinkState::Idle);
        let handle = VoicePipeline::start(unreachable_config().await, sink).unwrap();

        state_tx.send_replace(SinkState::Errored("no output device".into()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        state_tx.send_replace(SinkState::Ready);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(plays.load(Ordering::SeqCst), 0);
        handle.stop();
        tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let (sink, _tx, _plays) = ManualSink::new(SinkState::Ready);
        let config = PipelineConfig::new(ConnectorConfig::new("http://localhost:8080/"));
        assert!(VoicePipeline::start(config, sink).is_err());
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("RELAY_URL", "ws://relay.local:8080/"),
            ("ADAPTER_CAPACITY", "10"),
            ("ADAPTER_OVERFLOW", "drop-newest"),
            ("AUDIO_CONTAINER", "ogg"),
        ]
        .into_iter()
        .collect();

        let config = PipelineConfig::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.connector.url, "ws://relay.local:8080/");
        assert_eq!(config.adapter.capacity, 10);
        assert_eq!(config.adapter.overflow, OverflowPolicy::DropNewest);
        assert_eq!(config.encoding.container, Container::Ogg);
    }
}
