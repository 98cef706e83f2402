//! Service configuration
//!
//! Values an integrator sets once when the service is built. Defaults and
//! environment lookups live in `constants.rs`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants;
use crate::logic::cache::CacheConfig;
use crate::logic::error::{TelemetryError, TelemetryResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Collector endpoint, used for both POST and probe GET
    pub server_url: String,
    /// Interval between flush attempts, in seconds
    pub cooldown_secs: f64,
    /// Buffer capacity before eviction to the cache
    pub max_count: usize,
    /// Service outlives view/scene transitions
    pub persist_across_views: bool,
    /// Interval between reachability/replay checks, in seconds
    pub probe_interval_secs: f64,
    /// HTTP timeout, in seconds
    pub timeout_secs: u64,
    pub cache: CacheConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            cooldown_secs: constants::DEFAULT_COOLDOWN_SECS,
            max_count: constants::DEFAULT_MAX_COUNT,
            persist_across_views: false,
            probe_interval_secs: constants::DEFAULT_PROBE_INTERVAL_SECS,
            timeout_secs: constants::DEFAULT_TIMEOUT_SECS,
            cache: CacheConfig::default(),
        }
    }
}

impl TelemetryConfig {
    pub fn new(server_url: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            ..Default::default()
        }
    }

    /// Read every setting from the environment, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            server_url: constants::get_server_url(),
            cooldown_secs: constants::get_cooldown_secs(),
            max_count: constants::get_max_count(),
            persist_across_views: constants::is_persist_across_views(),
            probe_interval_secs: constants::get_probe_interval_secs(),
            timeout_secs: constants::get_timeout_secs(),
            cache: CacheConfig::from_env(),
        }
    }

    pub fn with_cooldown_secs(mut self, secs: f64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn with_persist_across_views(mut self, persist: bool) -> Self {
        self.persist_across_views = persist;
        self
    }

    pub fn with_probe_interval_secs(mut self, secs: f64) -> Self {
        self.probe_interval_secs = secs;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Check the configuration, clamping `max_count` to its minimum.
    pub fn validate(mut self) -> TelemetryResult<Self> {
        let url = self.server_url.trim();
        if url.is_empty() {
            return Err(TelemetryError::Configuration("Server url string is empty!".to_string()));
        }

        let parsed = reqwest::Url::parse(url)
            .map_err(|e| TelemetryError::Configuration(format!("Invalid server url '{}': {}", url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(TelemetryError::Configuration(format!(
                "Unsupported server url scheme '{}'",
                parsed.scheme()
            )));
        }
        self.server_url = url.to_string();

        check_interval("cooldown_secs", self.cooldown_secs)?;
        check_interval("probe_interval_secs", self.probe_interval_secs)?;

        if self.timeout_secs == 0 {
            return Err(TelemetryError::Configuration("timeout_secs must be positive".to_string()));
        }

        if self.max_count < constants::MIN_MAX_COUNT {
            log::warn!(
                "max_count {} is below the minimum, using {}",
                self.max_count,
                constants::MIN_MAX_COUNT
            );
            self.max_count = constants::MIN_MAX_COUNT;
        }

        Ok(self)
    }

    /// Flush interval. Falls back to the default on a config that was never validated.
    pub fn cooldown(&self) -> Duration {
        check_interval("cooldown_secs", self.cooldown_secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(constants::DEFAULT_COOLDOWN_SECS))
    }

    pub fn probe_interval(&self) -> Duration {
        check_interval("probe_interval_secs", self.probe_interval_secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(constants::DEFAULT_PROBE_INTERVAL_SECS))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Positive and at most `MAX_INTERVAL_SECS`, so timer deadlines cannot overflow
fn check_interval(name: &str, secs: f64) -> TelemetryResult<Duration> {
    if !(secs > 0.0 && secs <= constants::MAX_INTERVAL_SECS) {
        return Err(TelemetryError::Configuration(format!(
            "{} must be between 0 and {} seconds, got {}",
            name,
            constants::MAX_INTERVAL_SECS,
            secs
        )));
    }

    Duration::try_from_secs_f64(secs)
        .map_err(|e| TelemetryError::Configuration(format!("{} is out of range: {}", name, e)))
}
