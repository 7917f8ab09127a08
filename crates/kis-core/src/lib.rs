//! Core domain types for the KIS real-time relay.
//!
//! This crate provides the types shared by every other crate:
//! - `Environment`: Mock (paper) or Live account endpoints
//! - `AccessToken`, `AppCredentials`: auth material for the feed
//! - `StreamKind`, `Subscription`: what a symbol is subscribed to
//! - `MarketEvent`: decoded market data forwarded downstream

pub mod error;
pub mod event;
pub mod types;

pub use error::{CoreError, Result};
pub use event::{Execution, MarketEvent, Orderbook, PriceSnapshot, Side, DEPTH_LEVELS};
pub use types::{
    is_valid_symbol, AccessToken, AppCredentials, Environment, StreamKind, Subscription,
    MAX_SYMBOL_LEN,
};

use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
