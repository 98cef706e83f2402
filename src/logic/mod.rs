//! Logic Module - Buffering, Caching & Delivery Engine
//!
//! ## Architecture
//! - `telemetry/` - Event records + bounded in-memory buffer
//! - `cache/` - Durable append-only batch log (file / key-value backends)
//! - `delivery/` - HTTP delivery client + reachability probe
//! - `scheduler.rs` - Cancellable periodic flush/probe loops
//! - `service.rs` - TelemetryService facade and state machine

// Core modules
pub mod config;
pub mod error;
pub mod telemetry;

// Storage & transport
pub mod cache;
pub mod delivery;

// Orchestration
pub mod scheduler;
pub mod service;
