//! WebSocket client for the KIS real-time feed.
//!
//! Provides:
//! - A connection supervisor with fixed-delay reconnection and cancellation
//! - A cloneable write handle whose sends resolve once the frame hits the socket
//! - Subscribe frame construction
//! - The subscription registry, including resubscription after reconnect

pub mod connection;
pub mod error;
pub mod message;
pub mod subscription;
pub mod ws_write_handle;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState, InboundHandler};
pub use error::{RegistryError, RegistryResult, WsError, WsResult};
pub use message::SubscribeRequest;
pub use subscription::{RegistryConfig, SubscriptionRegistry};
pub use ws_write_handle::{WsOutbound, WsWriteHandle};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Install the rustls crypto provider.
/// Must be called before any TLS connection (WebSocket or HTTPS) is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
