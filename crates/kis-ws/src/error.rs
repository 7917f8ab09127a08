//! WebSocket and registry error types.

use kis_auth::AuthError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    /// No open socket to write to, or the socket dropped before the write.
    #[error("Connection unavailable")]
    ConnectionUnavailable,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;

/// Subscribe failures. The registry is left unchanged in every case.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Token acquisition failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Subscribe frame not delivered: {0}")]
    Connection(#[from] WsError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
