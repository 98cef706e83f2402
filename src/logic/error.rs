//! Error handling

use thiserror::Error;

pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Invalid setup, raised at construction only
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network unreachable, timeout or non-2xx response (recoverable)
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Batch could not be encoded; retrying cannot help
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Durable write/read failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for TelemetryError {
    fn from(err: std::io::Error) -> Self {
        TelemetryError::Storage(err.to_string())
    }
}

impl From<rusqlite::Error> for TelemetryError {
    fn from(err: rusqlite::Error) -> Self {
        TelemetryError::Storage(err.to_string())
    }
}
