//! Health check handler (used by the agent's reachability probe)

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::atomic::Ordering;

use crate::CollectorState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
}

pub async fn check(State(state): State<CollectorState>) -> Json<HealthResponse> {
    state.probes.fetch_add(1, Ordering::SeqCst);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
    })
}
