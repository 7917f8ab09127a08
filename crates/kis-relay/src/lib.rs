//! KIS real-time market data relay.
//!
//! Wires the components together:
//! - Token manager with a durable per-environment cache
//! - WebSocket supervisor and subscription registry
//! - Frame decoding inline on the read loop
//! - Bounded dispatch to the snapshot and execution sinks
//! - HTTP control surface

pub mod app;
pub mod config;
pub mod error;
pub mod pipeline;

pub use app::Application;
pub use config::RelayConfig;
pub use error::{AppError, AppResult};
pub use pipeline::FeedPipeline;
