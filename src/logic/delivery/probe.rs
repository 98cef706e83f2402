//! Reachability Probe
//!
//! Liveness check against the collector URL. Any HTTP response at all means
//! the collector is reachable; the status and body are not inspected.

#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    server_url: String,
    http_client: reqwest::Client,
}

impl ReachabilityProbe {
    pub fn new(server_url: &str, http_client: reqwest::Client) -> Self {
        Self {
            server_url: server_url.to_string(),
            http_client,
        }
    }

    pub async fn check(&self) -> bool {
        match self.http_client.get(&self.server_url).send().await {
            Ok(response) => {
                log::debug!("Collector reachable ({})", response.status().as_u16());
                true
            }
            Err(e) => {
                log::debug!("Collector not reachable: {}", e);
                false
            }
        }
    }
}
