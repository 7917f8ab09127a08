//! Dispatch error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Sink {sink} timed out")]
    Timeout { sink: String },

    #[error("Sink {sink} request failed: {reason}")]
    Request { sink: String, reason: String },

    #[error("Sink {sink} returned HTTP {status}")]
    HttpStatus { sink: String, status: u16 },
}

pub type DispatchResult<T> = Result<T, DispatchError>;
