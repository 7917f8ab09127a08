//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Auth error: {0}")]
    Auth(#[from] kis_auth::AuthError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] kis_ws::WsError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] kis_dispatch::DispatchError),

    #[error("Control server error: {0}")]
    Control(#[from] kis_control::ControlError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] kis_telemetry::TelemetryError),
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
