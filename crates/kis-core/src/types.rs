//! Environment, credential and subscription types.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Longest symbol accepted by the registry (KIS short codes are 6-9 chars).
pub const MAX_SYMBOL_LEN: usize = 12;

/// KIS account environment.
///
/// Each environment has its own REST and WebSocket endpoints and its own
/// access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Paper-trading (모의투자) endpoints.
    #[default]
    Mock,
    /// Real account endpoints.
    Live,
}

impl Environment {
    /// All environments, in a stable order.
    pub const ALL: [Environment; 2] = [Environment::Mock, Environment::Live];

    /// REST base URL (auth endpoint lives under it).
    pub fn rest_base_url(&self) -> &'static str {
        match self {
            Self::Mock => "https://openapivts.koreainvestment.com:29443",
            Self::Live => "https://openapi.koreainvestment.com:9443",
        }
    }

    /// Real-time WebSocket URL.
    pub fn ws_url(&self) -> &'static str {
        match self {
            Self::Mock => "ws://ops.koreainvestment.com:21000",
            Self::Live => "ws://ops.koreainvestment.com:31000",
        }
    }

    /// Lowercase name used in file names, metrics labels and config.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Live => "live",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" | "paper" => Ok(Self::Mock),
            "live" | "real" => Ok(Self::Live),
            other => Err(CoreError::InvalidEnvironment(other.to_string())),
        }
    }
}

/// Bearer token issued by the KIS auth endpoint.
///
/// Immutable once issued; a refresh produces a new token rather than
/// mutating this one.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
    environment: Environment,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>, environment: Environment) -> Self {
        Self {
            value: value.into(),
            expires_at,
            environment,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// A token is usable only while `now < expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("environment", &self.environment)
            .finish()
    }
}

/// App key/secret pair issued by KIS for the client application.
#[derive(Clone)]
pub struct AppCredentials {
    pub app_key: String,
    pub app_secret: Zeroizing<String>,
}

impl AppCredentials {
    pub fn new(app_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            app_secret: Zeroizing::new(app_secret.into()),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.app_key.trim().is_empty() && !self.app_secret.trim().is_empty()
    }
}

impl fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.app_key.chars().take(4).collect();
        f.debug_struct("AppCredentials")
            .field("app_key", &format!("{prefix}..."))
            .field("app_secret", &"<redacted>")
            .finish()
    }
}

/// Real-time stream kind, subscribed independently per symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Trade ticks (체결가), `H0STCNT0`.
    Trade,
    /// Order book depth (호가), `H0STASP0`.
    Orderbook,
}

impl StreamKind {
    /// Subscription order used when registering a symbol.
    pub const ALL: [StreamKind; 2] = [StreamKind::Trade, StreamKind::Orderbook];

    /// Transaction id used in subscribe frames.
    pub fn tr_id(&self) -> &'static str {
        match self {
            Self::Trade => "H0STCNT0",
            Self::Orderbook => "H0STASP0",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trade => write!(f, "trade"),
            Self::Orderbook => write!(f, "orderbook"),
        }
    }
}

/// A registered symbol and the stream kinds it is subscribed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub symbol: String,
    pub kinds: BTreeSet<StreamKind>,
}

impl Subscription {
    /// Subscription covering every stream kind.
    pub fn all_kinds(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            kinds: StreamKind::ALL.into_iter().collect(),
        }
    }
}

/// Check that a symbol is safe to put on the wire as a subscription key.
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol.chars().all(|c| c.is_ascii_alphanumeric())
}
