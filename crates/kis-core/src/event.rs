//! Decoded market events.
//!
//! Events are created only by the frame decoder and serialize directly into
//! the JSON payload the downstream backend expects (`ticker`, `timestamp`,
//! `tradeType`, camelCase arrays).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of price levels carried by snapshot and order book events.
pub const DEPTH_LEVELS: usize = 10;

/// Aggressor side of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Map a KIS trade code (체결구분) to a side.
    ///
    /// `1`, `B`, `+` are buys; `5`, `S`, `-` are sells. Anything else is
    /// not a recognizable execution.
    pub fn from_trade_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" | "B" | "+" => Some(Self::Buy),
            "5" | "S" | "-" => Some(Self::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Current price with (optional) top-of-book price levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    #[serde(rename = "ticker")]
    pub symbol: String,
    pub price: i64,
    pub volume: i64,
    pub ask_prices: [i64; DEPTH_LEVELS],
    pub bid_prices: [i64; DEPTH_LEVELS],
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

/// A single trade print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    #[serde(rename = "ticker")]
    pub symbol: String,
    pub price: i64,
    pub volume: i64,
    #[serde(rename = "tradeType")]
    pub side: Side,
    /// Exchange time as `HH:MM:SS`, display only.
    #[serde(rename = "time")]
    pub display_time: String,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

/// Ten-level order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Orderbook {
    #[serde(rename = "ticker")]
    pub symbol: String,
    /// Reference price: best bid if positive, otherwise best ask.
    pub price: i64,
    /// Aggregate traded volume. Always zero; the feed's totals are not summed.
    pub volume: i64,
    pub ask_prices: [i64; DEPTH_LEVELS],
    pub bid_prices: [i64; DEPTH_LEVELS],
    pub ask_volumes: [i64; DEPTH_LEVELS],
    pub bid_volumes: [i64; DEPTH_LEVELS],
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

/// Decoded market event.
///
/// Serialized untagged: the payload shape alone identifies the kind, which
/// is what the downstream endpoints accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MarketEvent {
    PriceSnapshot(PriceSnapshot),
    Execution(Execution),
    Orderbook(Orderbook),
}

impl MarketEvent {
    pub fn symbol(&self) -> &str {
        match self {
            Self::PriceSnapshot(e) => &e.symbol,
            Self::Execution(e) => &e.symbol,
            Self::Orderbook(e) => &e.symbol,
        }
    }

    pub fn price(&self) -> i64 {
        match self {
            Self::PriceSnapshot(e) => e.price,
            Self::Execution(e) => e.price,
            Self::Orderbook(e) => e.price,
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        match self {
            Self::PriceSnapshot(e) => e.timestamp_ms,
            Self::Execution(e) => e.timestamp_ms,
            Self::Orderbook(e) => e.timestamp_ms,
        }
    }

    /// Short kind label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PriceSnapshot(_) => "snapshot",
            Self::Execution(_) => "execution",
            Self::Orderbook(_) => "orderbook",
        }
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }
}
