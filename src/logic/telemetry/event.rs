//! Telemetry Event Types
//!
//! Immutable `(kind, payload)` records and their encodings:
//! - wire body: `{"events": [{"type": ..., "data": ...}, ...]}`
//! - cache line: one JSON array of event objects, no trailing newline

use serde::{Deserialize, Serialize};

use crate::logic::error::{TelemetryError, TelemetryResult};

// ============================================================================
// EVENT
// ============================================================================

/// A single telemetry event. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "data")]
    payload: String,
}

impl Event {
    pub fn new(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Human-readable form for log lines
    pub fn formatted(&self) -> String {
        format!("Type: {}\nData:[{}]", self.kind, self.payload)
    }
}

// ============================================================================
// WIRE BODY
// ============================================================================

/// Request body posted to the collector
#[derive(Debug, Serialize)]
pub struct EventBatch<'a> {
    pub events: &'a [Event],
}

/// Encode a batch as the POST body
pub fn encode_batch(events: &[Event]) -> TelemetryResult<Vec<u8>> {
    serde_json::to_vec(&EventBatch { events })
        .map_err(|e| TelemetryError::Serialization(e.to_string()))
}

// ============================================================================
// CACHE LINE
// ============================================================================

/// Encode a batch as a single cache line (without the newline)
pub fn encode_cache_line(events: &[Event]) -> TelemetryResult<String> {
    let line = serde_json::to_string(events)
        .map_err(|e| TelemetryError::Serialization(e.to_string()))?;

    // serde_json escapes control characters, so a batch can never span lines
    debug_assert!(!line.contains('\n'));
    Ok(line)
}

/// Decode one cache line back into its batch
pub fn decode_cache_line(line: &str) -> TelemetryResult<Vec<Event>> {
    serde_json::from_str(line).map_err(|e| TelemetryError::Serialization(e.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================
