//! Prometheus metrics and structured logging for the KIS relay.
//!
//! - Prometheus metrics for connection state, decoding, dispatch and auth
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging_with_default;
pub use metrics::Metrics;
