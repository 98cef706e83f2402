//! Telemetry Module
//!
//! Event records and the in-memory buffer that holds them until delivery.
//!
//! ## Structure
//! - `event.rs` - Event struct (immutable) + wire/cache encodings
//! - `buffer.rs` - bounded EventBuffer with eviction hook

pub mod buffer;
pub mod event;

pub use buffer::{EventBuffer, Watermark};
pub use event::{decode_cache_line, encode_batch, encode_cache_line, Event, EventBatch};
