//! Error types for kis-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
