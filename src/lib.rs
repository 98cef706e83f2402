//! Telemetry Agent
//!
//! Client-side event buffering and delivery. Application code tracks small
//! typed events; the agent batches them in memory, posts them to a remote
//! collector on a cooldown, and keeps anything it could not deliver in a
//! durable local cache until the collector is reachable again.
//!
//! ```no_run
//! use telemetry_agent::{TelemetryConfig, TelemetryService};
//!
//! # async fn run() -> Result<(), telemetry_agent::TelemetryError> {
//! let service = TelemetryService::launch(TelemetryConfig::new("http://localhost:8080/"))?;
//! service.track_event("startLevel", "level: 3");
//!
//! // host is going away
//! service.on_terminate()?;
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod logic;

pub use logic::cache::{CacheBackend, CacheConfig, PersistentCache};
pub use logic::config::TelemetryConfig;
pub use logic::delivery::{DeliveryClient, DeliveryOutcome, ReachabilityProbe};
pub use logic::error::{TelemetryError, TelemetryResult};
pub use logic::scheduler::{PeriodicTask, Scheduler};
pub use logic::service::{CycleOutcome, ServiceState, ServiceStatus, TelemetryService};
pub use logic::telemetry::{Event, EventBuffer};
