//! Frame decoding for the KIS real-time feed.
//!
//! Turns raw inbound frames into `MarketEvent`s. Two framings share the
//! socket:
//! - JSON control frames (heartbeats, subscribe acks, quote snapshots)
//! - `|`-multiplexed data frames whose payload is a `^`-separated field list
//!
//! Decoding never fails outward: anything unusable is dropped and counted.

pub mod error;
pub mod fields;
pub mod parser;

pub use error::FrameSkip;
pub use fields::{format_time, safe_int};
pub use parser::{DecodeStats, FrameDecoder};
