//! HTTP surface for playback consumers.
//!
//! Routes:
//! - `GET /` - JSON status (archive, rate, consumers, uptime)
//! - `GET /health` - liveness probe
//! - `GET /snapshot` - the current frame as `image/jpeg`
//! - `GET /stream` - `multipart/x-mixed-replace` MJPEG stream
//! - `POST /config` - change frame duration or rate at runtime
//! - `GET /metrics` - Prometheus text exposition

mod error;
mod handlers;
mod state;

pub use error::AppError;
pub use handlers::{PlaybackSettings, StatusResponse};
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

/// Errors that can occur during server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    /// The server stopped with an error.
    #[error("server error: {0}")]
    Server(String),
}

/// Builds the router over shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::status))
        .route("/health", get(handlers::health))
        .route("/snapshot", get(handlers::snapshot))
        .route("/stream", get(handlers::stream))
        .route("/config", post(handlers::update_playback))
        .route("/metrics", get(handlers::metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP server for snapshots, streams, status and metrics.
pub struct HttpServer {
    bind_addr: SocketAddr,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Creates a new server.
    pub fn new(bind_addr: SocketAddr, state: AppState) -> Self {
        Self {
            bind_addr,
            state: Arc::new(state),
        }
    }

    /// Returns the shared state.
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Runs the server until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        let app = build_router(self.state);
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!(
            addr = %self.bind_addr,
            "HTTP server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
