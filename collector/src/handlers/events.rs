//! Event ingestion handlers

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use chrono::Utc;
use std::sync::atomic::Ordering;

use crate::models::{IngestRequest, IngestResponse, ReceivedEvent};
use crate::{AppError, AppResult, CollectorState};

/// Accept one batch
pub async fn ingest(
    State(state): State<CollectorState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> AppResult<Json<IngestResponse>> {
    state.posts.fetch_add(1, Ordering::SeqCst);

    if state.reject.load(Ordering::SeqCst) {
        return Err(AppError::Unavailable);
    }

    let Json(req) = payload?;
    let accepted = req.events.len();
    let now = Utc::now();

    let total = {
        let mut events = state.events.write();
        let batch = state.batches.fetch_add(1, Ordering::SeqCst);

        events.extend(req.events.into_iter().map(|e| ReceivedEvent {
            kind: e.kind,
            data: e.data,
            batch,
            received_at: now,
        }));
        events.len()
    };

    tracing::info!("Accepted {} events ({} total)", accepted, total);

    Ok(Json(IngestResponse { accepted, total }))
}

/// Everything received so far
pub async fn list(State(state): State<CollectorState>) -> Json<Vec<ReceivedEvent>> {
    Json(state.events.read().clone())
}
