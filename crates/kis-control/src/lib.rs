//! HTTP control surface for the KIS relay.
//!
//! ```text
//! POST /subscribe/{ticker}    register a symbol (idempotent)
//! POST /unsubscribe/{ticker}  remove a symbol locally
//! GET  /subscriptions         registered symbols
//! GET  /health                connection state and subscription count
//! GET  /metrics               Prometheus exposition
//! ```

mod config;
mod error;
mod server;

pub use config::ControlConfig;
pub use error::{ControlError, ControlResult};
pub use server::{create_router, run_server, ControlState};
