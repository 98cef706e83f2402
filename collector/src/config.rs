//! Configuration module

use std::env;

/// Collector configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Start in reject mode (every POST answers 503)
    pub reject: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            host: env::var("COLLECTOR_HOST")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),

            port: env::var("COLLECTOR_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),

            reject: env::var("COLLECTOR_REJECT")
                .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}
