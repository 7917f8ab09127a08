//! Reasons a frame (or part of one) produced no event.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameSkip {
    #[error("heartbeat")]
    Heartbeat,

    #[error("subscribe acknowledged")]
    SubscribeAck,

    #[error("control frame without market data")]
    ControlFrame,

    #[error("neither JSON nor multiplexed")]
    Unrecognized,

    #[error("multiplexed frame has {0} segments, need 4")]
    TooFewSegments(usize),

    #[error("unknown tag {0:?}")]
    UnknownTag(String),

    #[error("{tag} has {got} fields, need {need}")]
    TooFewFields {
        tag: &'static str,
        got: usize,
        need: usize,
    },

    #[error("unrecognized trade code {0:?}")]
    UnrecognizedTradeCode(String),

    #[error("no trade (price={price}, volume={volume}), market closed")]
    NoTrade { price: i64, volume: i64 },
}

impl FrameSkip {
    /// Metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::SubscribeAck => "subscribe_ack",
            Self::ControlFrame => "control_frame",
            Self::Unrecognized => "unrecognized",
            Self::TooFewSegments(_) => "too_few_segments",
            Self::UnknownTag(_) => "unknown_tag",
            Self::TooFewFields { .. } => "too_few_fields",
            Self::UnrecognizedTradeCode(_) => "unrecognized_trade_code",
            Self::NoTrade { .. } => "no_trade",
        }
    }
}
