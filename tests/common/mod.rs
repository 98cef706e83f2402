//! Shared helpers: a development collector on an ephemeral port

#![allow(dead_code)]

use std::net::SocketAddr;
use telemetry_agent::logic::cache::{KeyValueBackend, MemoryStore};
use telemetry_agent::{PersistentCache, TelemetryConfig, TelemetryService};
use telemetry_collector::CollectorState;

pub struct TestCollector {
    pub url: String,
    pub state: CollectorState,
}

pub async fn start_collector() -> TestCollector {
    let state = CollectorState::new();
    let addr = telemetry_collector::spawn(SocketAddr::from(([127, 0, 0, 1], 0)), state.clone())
        .await
        .expect("bind collector");

    TestCollector {
        url: format!("http://{}/", addr),
        state,
    }
}

/// A URL nothing listens on
pub async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}

/// Service over a shared in-memory cache so tests can simulate restarts
pub fn service_with_store(config: TelemetryConfig, store: &MemoryStore) -> TelemetryService {
    let cache = PersistentCache::with_backend(Box::new(KeyValueBackend::new(store.clone(), "cache")));
    TelemetryService::with_cache(config, cache).expect("valid config")
}

pub fn payloads(collector: &TestCollector) -> Vec<String> {
    collector.state.received().into_iter().map(|e| e.data).collect()
}
