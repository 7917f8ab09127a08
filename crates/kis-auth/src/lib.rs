//! Access token management for the KIS relay.
//!
//! Exchanges app credentials for a bearer token, keeps it in a durable
//! per-environment cache, and guarantees a single in-flight refresh per
//! environment.

pub mod client;
pub mod error;
pub mod manager;
pub mod token_cache;

pub use client::{AuthClient, IssuedToken, TokenIssuer};
pub use error::{AuthError, AuthResult};
pub use manager::{TokenManager, TokenSource};
pub use token_cache::{CachedToken, FileTokenStore, MemoryTokenStore, TokenStore};
