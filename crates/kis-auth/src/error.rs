//! Auth error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("App credentials are not configured")]
    MissingCredentials,

    #[error("Token request rejected: HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    #[error("Token cache error: {0}")]
    Cache(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;
