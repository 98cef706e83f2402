//! Delivery Module - Agent to Collector Communication
//!
//! This module handles:
//! - Posting event batches (`client.rs`)
//! - Reachability probing before a post (`probe.rs`)

pub mod client;
pub mod probe;

use std::time::Duration;

use crate::logic::error::{TelemetryError, TelemetryResult};

pub use client::{DeliveryClient, DeliveryOutcome};
pub use probe::ReachabilityProbe;

/// Shared HTTP client for delivery and probing
pub fn build_http_client(timeout: Duration) -> TelemetryResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("telemetry-agent/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TelemetryError::Configuration(format!("Failed to create HTTP client: {}", e)))
}
