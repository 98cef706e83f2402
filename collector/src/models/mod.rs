//! Wire models

pub mod event;

pub use event::{IngestRequest, IngestResponse, ReceivedEvent};
