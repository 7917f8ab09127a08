//! Telemetry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed, or the filter is invalid.
    #[error("Logging initialization failed: {0}")]
    LoggingInit(String),

    #[error("Metrics encoding failed: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("Metrics output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
