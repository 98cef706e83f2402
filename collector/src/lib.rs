//! Telemetry Collector
//!
//! Minimal development collector for the agent's wire protocol:
//!
//! - `GET /` - liveness (reachability probe target)
//! - `POST /` - `{"events": [{"type": ..., "data": ...}]}`
//! - `GET /events` - everything received so far
//!
//! Events are kept in memory only. Reject mode answers 503 to every POST so
//! the agent's retry path can be exercised.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;

use axum::{routing::get, Router};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};
pub use models::ReceivedEvent;

/// Shared collector state. Clones share the same storage.
#[derive(Clone, Default)]
pub struct CollectorState {
    pub events: Arc<RwLock<Vec<ReceivedEvent>>>,
    pub batches: Arc<AtomicUsize>,
    pub posts: Arc<AtomicUsize>,
    pub probes: Arc<AtomicUsize>,
    pub reject: Arc<AtomicBool>,
}

impl CollectorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Received events in arrival order
    pub fn received(&self) -> Vec<ReceivedEvent> {
        self.events.read().clone()
    }

    /// Accepted batches
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// All POST requests, accepted or not
    pub fn post_count(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

/// Create the router
pub fn router(state: CollectorState) -> Router {
    Router::new()
        .route("/", get(handlers::health::check).post(handlers::events::ingest))
        .route("/events", get(handlers::events::list))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve in a background task. Returns the bound address
/// (useful with port 0).
pub async fn spawn(addr: SocketAddr, state: CollectorState) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    let app = router(state);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Collector stopped: {}", e);
        }
    });

    Ok(local)
}
