//! Read-only HTTP view of the renderer's stats.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use retimer_common::stats::{RendererStats, StatsObserver};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

// ---------------------------------------------------------------------------
// Stats board
// ---------------------------------------------------------------------------

/// Latest published stats window, shared between the renderer and the server.
#[derive(Debug, Default)]
pub struct StatsBoard {
    latest: RwLock<Option<RendererStats>>,
    running: AtomicBool,
}

impl StatsBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<RendererStats> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Record a lifecycle change between stats windows.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }
}

impl StatsObserver for StatsBoard {
    fn on_stats(&self, stats: &RendererStats) {
        self.set_running(stats.is_running);
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(stats.clone());
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    running: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /stats — the last closed stats window
async fn get_stats(State(board): State<Arc<StatsBoard>>) -> Response {
    match board.latest() {
        Some(stats) => Json(stats).into_response(),
        None => (StatusCode::NOT_FOUND, "no stats published yet").into_response(),
    }
}

/// GET /health
async fn get_health(State(board): State<Arc<StatsBoard>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        running: board.is_running(),
    })
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

pub fn router(board: Arc<StatsBoard>) -> Router {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/health", get(get_health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(board)
}

/// Serve the stats API on `bind` until `shutdown` resolves.
pub async fn serve(
    bind: &str,
    board: Arc<StatsBoard>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ApiError> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|source| ApiError::Bind {
            addr: bind.to_string(),
            source,
        })?;
    info!(addr = bind, "stats API listening");

    axum::serve(listener, router(board))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ApiError::Serve)
}
