use std::{sync::Arc, time::Duration};

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Semaphore};

use crate::{
    archive::LoadError,
    config::HttpConfig,
    consumers::SessionRegistry,
    metrics::{MetricsError, MetricsRegistry, MetricsSnapshot},
    playback::{Clock, FrameStore},
};

use super::error::AppError;

/// Shared state handed to every HTTP handler.
pub struct AppState {
    store: Option<Arc<FrameStore>>,
    load_error: Option<String>,
    /// Time source for polls.
    pub clock: Arc<dyn Clock>,
    /// Prometheus registry behind `/metrics`.
    pub metrics: MetricsRegistry,
    /// Permits for concurrent multipart streams.
    pub stream_limit: Arc<Semaphore>,
    /// How often a stream polls the store.
    pub stream_poll: Duration,
    max_stream_clients: usize,
    broadcast: Option<SessionRegistry>,
    broadcast_port: Option<u16>,
    started_at: DateTime<Utc>,
    shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Builds state from the outcome of archive loading.
    ///
    /// A failed load keeps the server up with playback routes disabled.
    pub fn new(
        playback: Result<Arc<FrameStore>, LoadError>,
        clock: Arc<dyn Clock>,
        http: &HttpConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, MetricsError> {
        let (store, load_error) = match playback {
            Ok(store) => (Some(store), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Ok(Self {
            store,
            load_error,
            clock,
            metrics: MetricsRegistry::new()?,
            stream_limit: Arc::new(Semaphore::new(http.max_stream_clients)),
            stream_poll: Duration::from_millis(http.stream_poll_ms),
            max_stream_clients: http.max_stream_clients,
            broadcast: None,
            broadcast_port: None,
            started_at: Utc::now(),
            shutdown,
        })
    }

    /// Attaches the broadcaster's session registry for reporting.
    pub fn with_broadcast(mut self, registry: SessionRegistry, port: u16) -> Self {
        self.broadcast = Some(registry);
        self.broadcast_port = Some(port);
        self
    }

    /// The frame store, or a 404 when playback is disabled.
    pub fn store(&self) -> Result<&Arc<FrameStore>, AppError> {
        self.store
            .as_ref()
            .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "Video provider is not initialized"))
    }

    /// Whether the archive loaded.
    pub fn playback_available(&self) -> bool {
        self.store.is_some()
    }

    /// Why the archive failed to load, if it did.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// When the state was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Port advertised for broadcast sessions.
    pub fn broadcast_port(&self) -> Option<u16> {
        self.broadcast_port
    }

    /// Open multipart stream connections.
    pub fn stream_clients(&self) -> usize {
        self.max_stream_clients - self.stream_limit.available_permits()
    }

    /// Live broadcast sessions.
    pub fn broadcast_sessions(&self) -> usize {
        self.broadcast
            .as_ref()
            .map(SessionRegistry::num_connected)
            .unwrap_or(0)
    }

    /// Receiver that flips to `true` when the server is shutting down.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    /// Collects the current player state for metrics.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::from_components(
            self.store.as_deref(),
            self.stream_clients(),
            self.broadcast_sessions(),
        )
    }
}
