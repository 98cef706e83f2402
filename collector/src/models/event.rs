//! Event batch model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One event as posted by the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
}

/// `POST /` body
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub events: Vec<WireEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub total: usize,
}

/// Stored event with its arrival metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReceivedEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
    /// Index of the batch this event arrived in
    pub batch: usize,
    pub received_at: DateTime<Utc>,
}
