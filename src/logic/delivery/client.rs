//! Delivery Client
//!
//! One POST of one batch. Retry policy lives in the service.

use crate::constants::CONTENT_TYPE;
use crate::logic::error::TelemetryResult;
use crate::logic::telemetry::{encode_batch, Event};

/// Result of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Collector answered 2xx
    Delivered,
    /// Collector answered with a non-2xx status
    Rejected { status: u16, message: String },
    /// No usable response (connection refused, timeout, ...)
    TransportFailure(String),
}

/// HTTP client posting event batches to the collector
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    server_url: String,
    http_client: reqwest::Client,
}

impl DeliveryClient {
    pub fn new(server_url: &str, http_client: reqwest::Client) -> Self {
        Self {
            server_url: server_url.to_string(),
            http_client,
        }
    }

    /// Post `batch` as `{"events": [...]}`.
    ///
    /// Only a batch that cannot be encoded yields `Err`; every network
    /// outcome is reported through [`DeliveryOutcome`].
    pub async fn send(&self, batch: &[Event]) -> TelemetryResult<DeliveryOutcome> {
        let body = encode_batch(batch)?;

        log::debug!("Posting {} events ({} bytes) to {}", batch.len(), body.len(), self.server_url);

        let response = match self
            .http_client
            .post(&self.server_url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(DeliveryOutcome::TransportFailure(e.to_string())),
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            log::debug!("Collector response ({}): {}", status.as_u16(), text);
            Ok(DeliveryOutcome::Delivered)
        } else {
            Ok(DeliveryOutcome::Rejected {
                status: status.as_u16(),
                message: text,
            })
        }
    }
}
