//! Relay server listener
//!
//! Binds the TCP listener, serves the websocket endpoint plus the liveness and
//! stats endpoints, and tears every connection down on shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{Notify, Semaphore};

use super::config::RelayConfig;
use super::session;
use crate::error::Result;
use crate::registry::{ClientRegistry, ConnectionId};
use crate::stats::RelayStatsSnapshot;

/// How long shutdown waits for sessions to flush their close frames
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Counts live websocket sessions so shutdown can wait for them
#[derive(Default)]
pub(super) struct SessionTracker {
    live: AtomicUsize,
    idle: Notify,
}

/// Decrements the live count when a session ends
pub(super) struct SessionGuard<'a>(&'a SessionTracker);

impl SessionTracker {
    pub(super) fn enter(&self) -> SessionGuard<'_> {
        self.live.fetch_add(1, Ordering::AcqRel);
        SessionGuard(self)
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let idle = self.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.live() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, idle).await.is_err() {
                return self.live() == 0;
            }
        }
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.0.live.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// State shared by the HTTP handlers and every session
pub(super) struct RelayShared {
    pub(super) config: RelayConfig,
    pub(super) registry: Arc<ClientRegistry>,
    pub(super) sessions: SessionTracker,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RelayShared {
    pub(super) fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Websocket audio relay
///
/// # Example
/// ```no_run
/// use voice_relay::{RelayConfig, RelayServer};
///
/// # async fn example() -> voice_relay::Result<()> {
/// let server = RelayServer::bind(RelayConfig::default()).await?;
/// server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await?;
/// # Ok(())
/// # }
/// ```
pub struct RelayServer {
    listener: TcpListener,
    shared: Arc<RelayShared>,
}

impl RelayServer {
    /// Bind the listener; no connections are served until `run`
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        Self::bind_with_registry(config, Arc::new(ClientRegistry::new())).await
    }

    /// Bind with an externally owned registry
    pub async fn bind_with_registry(
        config: RelayConfig,
        registry: Arc<ClientRegistry>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;

        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let shared = Arc::new(RelayShared {
            config,
            registry,
            sessions: SessionTracker::default(),
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        });

        Ok(Self { listener, shared })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Get a reference to the connection registry
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.shared.registry
    }

    /// Router with the relay endpoints
    ///
    /// - `GET /` websocket upgrade
    /// - `GET /health` liveness, always 200
    /// - `GET /stats` relay counters
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(upgrade))
            .route("/health", get(health))
            .route("/stats", get(stats))
            .with_state(Arc::clone(&self.shared))
    }

    /// Run the server
    ///
    /// This method only returns on a listener error.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    ///
    /// When `shutdown` resolves the listener stops accepting, every tracked
    /// connection is closed and the registry is cleared.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        let router = self.router();
        let shared = Arc::clone(&self.shared);
        let registry = Arc::clone(&self.shared.registry);

        tracing::info!(addr = %addr, "Relay listening");

        axum::serve(
            self.listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            registry.close_all().await;
        })
        .await?;

        if !shared.sessions.wait_idle(DRAIN_TIMEOUT).await {
            tracing::warn!(
                live = shared.sessions.live(),
                "Sessions still open after drain timeout"
            );
        }

        tracing::info!("Relay stopped");
        Ok(())
    }
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(shared): State<Arc<RelayShared>>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
) -> Response {
    let permit = match shared.connection_semaphore {
        Some(ref sem) => match Arc::clone(sem).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                shared.registry.stats().record_rejected();
                tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        },
        None => None,
    };

    tracing::debug!(peer = %peer_addr, "New connection");

    let max_message_size = shared.config.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| session::run(socket, shared, peer_addr, permit))
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

#[derive(Serialize)]
struct StatsBody {
    producers: usize,
    consumers: usize,
    #[serde(flatten)]
    counters: RelayStatsSnapshot,
}

async fn stats(State(shared): State<Arc<RelayShared>>) -> Json<StatsBody> {
    Json(StatsBody {
        producers: shared.registry.producer_count().await,
        consumers: shared.registry.consumer_count().await,
        counters: shared.registry.stats().snapshot(),
    })
}
