//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Environment helpers fall back to these values when a variable is unset
//! or cannot be parsed.

/// Default flush cooldown (seconds)
pub const DEFAULT_COOLDOWN_SECS: f64 = 1.0;

/// Default reachability probe interval (seconds)
pub const DEFAULT_PROBE_INTERVAL_SECS: f64 = 30.0;

/// Longest accepted cooldown or probe interval (seconds), one week
pub const MAX_INTERVAL_SECS: f64 = 7.0 * 24.0 * 60.0 * 60.0;

/// Default HTTP timeout (seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default buffer capacity before eviction to the cache
pub const DEFAULT_MAX_COUNT: usize = 1000;

/// Smallest accepted buffer capacity. Anything lower thrashes the cache.
pub const MIN_MAX_COUNT: usize = 50;

/// Directory name under the platform local data dir
pub const DATA_DIR_NAME: &str = "telemetry-agent";

/// Cache file name (file backend)
pub const CACHE_FILE_NAME: &str = "events_cache.jsonl";

/// Database file name (sqlite key-value backend)
pub const CACHE_DB_NAME: &str = "events_cache.db";

/// Key holding the cached batches (key-value backends)
pub const CACHE_KEY: &str = "telemetry_events_cache";

/// Content type sent with every batch
pub const CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get collector URL from environment (empty when unset)
pub fn get_server_url() -> String {
    std::env::var("TELEMETRY_SERVER_URL").unwrap_or_default()
}

/// Get flush cooldown from environment or use default
pub fn get_cooldown_secs() -> f64 {
    std::env::var("TELEMETRY_COOLDOWN_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_COOLDOWN_SECS)
}

/// Get probe interval from environment or use default
pub fn get_probe_interval_secs() -> f64 {
    std::env::var("TELEMETRY_PROBE_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PROBE_INTERVAL_SECS)
}

/// Get HTTP timeout from environment or use default
pub fn get_timeout_secs() -> u64 {
    std::env::var("TELEMETRY_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

/// Get buffer capacity from environment or use default
pub fn get_max_count() -> usize {
    std::env::var("TELEMETRY_MAX_COUNT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_MAX_COUNT)
}

/// Check if the service outlives view transitions
pub fn is_persist_across_views() -> bool {
    std::env::var("TELEMETRY_PERSIST_ACROSS_VIEWS")
        .map(|s| s.to_lowercase() == "true" || s == "1")
        .unwrap_or(false)
}

/// Get cache backend name (`file`, `sqlite`, `memory`)
pub fn get_cache_backend() -> String {
    std::env::var("TELEMETRY_CACHE_BACKEND")
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|_| "file".to_string())
}

/// Get explicit cache path, if any
pub fn get_cache_path() -> Option<std::path::PathBuf> {
    std::env::var("TELEMETRY_CACHE_PATH")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(std::path::PathBuf::from)
}

/// Platform data directory for cache files
pub fn data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(DATA_DIR_NAME)
}
