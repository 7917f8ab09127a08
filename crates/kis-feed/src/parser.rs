//! Frame decoder.
//!
//! Recognized multiplexed tags:
//! - `H0STCNT0`: price snapshot plus execution from the same payload
//! - `H0STCNT1`, `H0STCIT0`: execution only
//! - `H0STASP0`: ten-level order book

use crate::error::FrameSkip;
use crate::fields::{field, format_time, int_array, safe_int};
use chrono::Utc;
use kis_core::{Execution, MarketEvent, Orderbook, PriceSnapshot, Side, DEPTH_LEVELS};
use kis_telemetry::Metrics;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

const TAG_PRICE_AND_EXECUTION: &str = "H0STCNT0";
const TAG_EXECUTION: &str = "H0STCNT1";
const TAG_EXECUTION_HISTORY: &str = "H0STCIT0";
const TAG_ORDERBOOK: &str = "H0STASP0";

const HEARTBEAT_TR_ID: &str = "PINGPONG";
const SUBSCRIBE_SUCCESS: &str = "SUBSCRIBE SUCCESS";

/// Minimum payload sizes per layout.
const SNAPSHOT_MIN_FIELDS: usize = 15;
const EXECUTION_MIN_FIELDS: usize = 22;
const ORDERBOOK_MIN_FIELDS: usize = 50;

/// Field offsets in trade payloads.
const FIELD_SYMBOL: usize = 0;
const FIELD_TIME: usize = 1;
const FIELD_PRICE: usize = 2;
const FIELD_EXEC_VOLUME: usize = 12;
const FIELD_CUM_VOLUME: usize = 13;
const FIELD_TRADE_CODE: usize = 21;

/// Field offsets in order book payloads.
const FIELD_ASKS: usize = 3;
const FIELD_BIDS: usize = FIELD_ASKS + DEPTH_LEVELS;
const FIELD_ASK_DEPTHS: usize = FIELD_BIDS + DEPTH_LEVELS;
const FIELD_BID_DEPTHS: usize = FIELD_ASK_DEPTHS + DEPTH_LEVELS;

/// Decoder counters.
#[derive(Debug, Default)]
pub struct DecodeStats {
    /// Frames that produced at least one event.
    pub decoded_count: AtomicU64,
    /// Frames, or parts of a frame, that produced nothing.
    pub skipped_count: AtomicU64,
    /// Events emitted.
    pub event_count: AtomicU64,
}

impl DecodeStats {
    fn record_decoded(&self, events: usize) {
        self.decoded_count.fetch_add(1, Ordering::Relaxed);
        self.event_count.fetch_add(events as u64, Ordering::Relaxed);
    }

    fn record_skipped(&self) {
        self.skipped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decoded(&self) -> u64 {
        self.decoded_count.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped_count.load(Ordering::Relaxed)
    }

    pub fn events(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }
}

/// Stateless apart from its counters; safe to share across tasks.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    stats: DecodeStats,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Decode one inbound frame, stamping events with the current time.
    ///
    /// An empty result means the frame was dropped.
    pub fn decode(&self, raw: &str) -> Vec<MarketEvent> {
        self.decode_at(raw, Utc::now().timestamp_millis())
    }

    /// Decode one inbound frame with an explicit receipt time.
    pub fn decode_at(&self, raw: &str, received_ms: i64) -> Vec<MarketEvent> {
        let (label, result) = match serde_json::from_str::<Value>(raw) {
            Ok(frame @ Value::Object(_)) => ("json", self.decode_structured(&frame, received_ms)),
            _ if raw.contains('|') => self.decode_multiplexed(raw, received_ms),
            _ => ("unknown", Err(FrameSkip::Unrecognized)),
        };

        match result {
            Ok(events) => {
                self.stats.record_decoded(events.len());
                Metrics::frame_decoded(label);
                events
            }
            Err(skip) => {
                self.note_skip(&skip);
                Vec::new()
            }
        }
    }

    fn note_skip(&self, skip: &FrameSkip) {
        self.stats.record_skipped();
        Metrics::frame_skipped(skip.reason());
        match skip {
            FrameSkip::Heartbeat => {}
            FrameSkip::SubscribeAck => info!("Subscription acknowledged"),
            _ => debug!(reason = %skip, "Frame skipped"),
        }
    }

    /// JSON control frame.
    fn decode_structured(&self, frame: &Value, received_ms: i64) -> Result<Vec<MarketEvent>, FrameSkip> {
        let tr_id = frame
            .pointer("/header/tr_id")
            .and_then(Value::as_str)
            .unwrap_or("");
        if tr_id == HEARTBEAT_TR_ID {
            return Err(FrameSkip::Heartbeat);
        }

        let empty = Value::Null;
        let body = frame.get("body").unwrap_or(&empty);

        if body.get("msg1").and_then(Value::as_str) == Some(SUBSCRIBE_SUCCESS) {
            return Err(FrameSkip::SubscribeAck);
        }

        if let Some(rt_cd) = body.get("rt_cd").and_then(Value::as_str) {
            if rt_cd != "0" {
                let msg = body.get("msg1").and_then(Value::as_str).unwrap_or("");
                let msg_cd = body.get("msg_cd").and_then(Value::as_str).unwrap_or("");
                warn!(tr_id, rt_cd, msg_cd, msg, "Control request rejected");
            }
        }

        let symbol = body.get("symbol").and_then(Value::as_str).unwrap_or("");
        if symbol.is_empty() {
            return Err(FrameSkip::ControlFrame);
        }

        let level = |prefix: &str, i: usize| json_int(body.get(format!("{prefix}{}", i + 1)));
        let snapshot = PriceSnapshot {
            symbol: symbol.to_string(),
            price: json_int(body.get("stck_prpr")),
            volume: json_int(body.get("acml_vol")),
            ask_prices: std::array::from_fn(|i| level("askp", i)),
            bid_prices: std::array::from_fn(|i| level("bidp", i)),
            timestamp_ms: received_ms,
        };

        Ok(vec![MarketEvent::PriceSnapshot(snapshot)])
    }

    /// `|`-multiplexed data frame: `flag|tag|count|payload`.
    fn decode_multiplexed(
        &self,
        raw: &str,
        received_ms: i64,
    ) -> (&'static str, Result<Vec<MarketEvent>, FrameSkip>) {
        let segments: Vec<&str> = raw.split('|').collect();
        if segments.len() < 4 {
            return ("unknown", Err(FrameSkip::TooFewSegments(segments.len())));
        }

        let fields: Vec<&str> = segments[3].split('^').collect();
        let execution_only = |tag: &'static str| {
            let result = parse_execution(tag, &fields, received_ms)
                .map(|execution| vec![MarketEvent::Execution(execution)]);
            (tag, result)
        };

        match segments[1] {
            TAG_PRICE_AND_EXECUTION => {
                let tag = TAG_PRICE_AND_EXECUTION;
                let snapshot = match parse_price_snapshot(&fields, received_ms) {
                    Ok(snapshot) => snapshot,
                    Err(skip) => return (tag, Err(skip)),
                };

                let mut events = vec![MarketEvent::PriceSnapshot(snapshot)];
                match parse_execution(tag, &fields, received_ms) {
                    Ok(execution) => events.push(MarketEvent::Execution(execution)),
                    Err(skip) => self.note_skip(&skip),
                }
                (tag, Ok(events))
            }
            TAG_EXECUTION => execution_only(TAG_EXECUTION),
            TAG_EXECUTION_HISTORY => execution_only(TAG_EXECUTION_HISTORY),
            TAG_ORDERBOOK => {
                let result = parse_orderbook(&fields, received_ms)
                    .map(|book| vec![MarketEvent::Orderbook(book)]);
                (TAG_ORDERBOOK, result)
            }
            other => ("unknown", Err(FrameSkip::UnknownTag(other.to_string()))),
        }
    }
}

/// Integer from a JSON value that may be a string or a number.
fn json_int(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::String(s)) => safe_int(s),
        Some(Value::Number(n)) => n
            .as_i64()
            .filter(|n| (i64::from(i32::MIN)..=i64::from(i32::MAX)).contains(n))
            .unwrap_or(0),
        _ => 0,
    }
}

fn require_fields(tag: &'static str, fields: &[&str], need: usize) -> Result<(), FrameSkip> {
    if fields.len() < need {
        return Err(FrameSkip::TooFewFields {
            tag,
            got: fields.len(),
            need,
        });
    }
    Ok(())
}

fn parse_price_snapshot(fields: &[&str], received_ms: i64) -> Result<PriceSnapshot, FrameSkip> {
    require_fields(TAG_PRICE_AND_EXECUTION, fields, SNAPSHOT_MIN_FIELDS)?;

    Ok(PriceSnapshot {
        symbol: field(fields, FIELD_SYMBOL).to_string(),
        price: safe_int(field(fields, FIELD_PRICE)),
        volume: safe_int(field(fields, FIELD_CUM_VOLUME)),
        ask_prices: [0; DEPTH_LEVELS],
        bid_prices: [0; DEPTH_LEVELS],
        timestamp_ms: received_ms,
    })
}

fn parse_execution(
    tag: &'static str,
    fields: &[&str],
    received_ms: i64,
) -> Result<Execution, FrameSkip> {
    require_fields(tag, fields, EXECUTION_MIN_FIELDS)?;

    let code = field(fields, FIELD_TRADE_CODE).trim();
    let side =
        Side::from_trade_code(code).ok_or_else(|| FrameSkip::UnrecognizedTradeCode(code.to_string()))?;

    let price = safe_int(field(fields, FIELD_PRICE));
    let volume = safe_int(field(fields, FIELD_EXEC_VOLUME));
    if price <= 0 || volume <= 0 {
        return Err(FrameSkip::NoTrade { price, volume });
    }

    Ok(Execution {
        symbol: field(fields, FIELD_SYMBOL).to_string(),
        price,
        volume,
        side,
        display_time: format_time(field(fields, FIELD_TIME)),
        timestamp_ms: received_ms,
    })
}

fn parse_orderbook(fields: &[&str], received_ms: i64) -> Result<Orderbook, FrameSkip> {
    require_fields(TAG_ORDERBOOK, fields, ORDERBOOK_MIN_FIELDS)?;

    let ask_prices: [i64; DEPTH_LEVELS] = int_array(fields, FIELD_ASKS);
    let bid_prices: [i64; DEPTH_LEVELS] = int_array(fields, FIELD_BIDS);
    let price = if bid_prices[0] > 0 {
        bid_prices[0]
    } else {
        ask_prices[0]
    };

    Ok(Orderbook {
        symbol: field(fields, FIELD_SYMBOL).to_string(),
        price,
        volume: 0,
        ask_prices,
        bid_prices,
        ask_volumes: int_array(fields, FIELD_ASK_DEPTHS),
        bid_volumes: int_array(fields, FIELD_BID_DEPTHS),
        timestamp_ms: received_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    /// Build a `^` payload of `len` fields, all "0", with overrides.
    fn payload(len: usize, overrides: &[(usize, &str)]) -> String {
        let mut fields = vec!["0".to_string(); len];
        for (idx, value) in overrides {
            fields[*idx] = value.to_string();
        }
        fields.join("^")
    }

    fn trade_payload(price: &str, volume: &str, code: &str) -> String {
        payload(
            22,
            &[
                (FIELD_SYMBOL, "005930"),
                (FIELD_TIME, "093015"),
                (FIELD_PRICE, price),
                (FIELD_EXEC_VOLUME, volume),
                (FIELD_CUM_VOLUME, "123456"),
                (FIELD_TRADE_CODE, code),
            ],
        )
    }

    #[test]
    fn test_execution_frame() {
        let decoder = FrameDecoder::new();
        let raw = format!("0|H0STCNT1|001|{}", trade_payload("70000", "10", "+"));

        let events = decoder.decode_at(&raw, NOW);
        assert_eq!(
            events,
            vec![MarketEvent::Execution(Execution {
                symbol: "005930".to_string(),
                price: 70000,
                volume: 10,
                side: Side::Buy,
                display_time: "09:30:15".to_string(),
                timestamp_ms: NOW,
            })]
        );
        assert_eq!(decoder.stats().decoded(), 1);
    }

    #[test]
    fn test_execution_history_tag_sell() {
        let decoder = FrameDecoder::new();
        let raw = format!("0|H0STCIT0|001|{}", trade_payload("51000", "3", " S "));

        let events = decoder.decode_at(&raw, NOW);
        assert_eq!(events.len(), 1);
        match &events[0] {
            MarketEvent::Execution(e) => assert_eq!(e.side, Side::Sell),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_zero_price_execution_dropped() {
        let decoder = FrameDecoder::new();
        let raw = format!("0|H0STCNT1|001|{}", trade_payload("0", "10", "1"));

        assert!(decoder.decode_at(&raw, NOW).is_empty());
        assert_eq!(decoder.stats().skipped(), 1);
    }

    #[test]
    fn test_unrecognized_trade_code_dropped() {
        let decoder = FrameDecoder::new();
        let raw = format!("0|H0STCNT1|001|{}", trade_payload("70000", "10", "x"));
        assert!(decoder.decode_at(&raw, NOW).is_empty());
    }

    #[test]
    fn test_short_execution_payload_dropped() {
        let decoder = FrameDecoder::new();
        let raw = format!("0|H0STCNT1|001|{}", payload(21, &[(FIELD_PRICE, "70000")]));
        assert!(decoder.decode_at(&raw, NOW).is_empty());
    }

    #[test]
    fn test_price_tag_yields_snapshot_and_execution() {
        let decoder = FrameDecoder::new();
        let raw = format!("0|H0STCNT0|001|{}", trade_payload("70000", "10", "5"));

        let events = decoder.decode_at(&raw, NOW);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            MarketEvent::PriceSnapshot(PriceSnapshot {
                symbol: "005930".to_string(),
                price: 70000,
                volume: 123456,
                ask_prices: [0; DEPTH_LEVELS],
                bid_prices: [0; DEPTH_LEVELS],
                timestamp_ms: NOW,
            })
        );
        match &events[1] {
            MarketEvent::Execution(e) => {
                assert_eq!(e.side, Side::Sell);
                assert_eq!(e.volume, 10);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_price_tag_snapshot_survives_bad_trade_code() {
        let decoder = FrameDecoder::new();
        let raw = format!("0|H0STCNT0|001|{}", trade_payload("70000", "10", "?"));

        let events = decoder.decode_at(&raw, NOW);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "snapshot");
    }

    #[test]
    fn test_price_tag_between_snapshot_and_execution_minimum() {
        let decoder = FrameDecoder::new();
        let raw = format!(
            "0|H0STCNT0|001|{}",
            payload(15, &[(FIELD_SYMBOL, "005930"), (FIELD_PRICE, "100")])
        );

        let events = decoder.decode_at(&raw, NOW);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].price(), 100);
    }

    #[test]
    fn test_orderbook_exactly_fifty_fields() {
        let decoder = FrameDecoder::new();
        let mut overrides: Vec<(usize, String)> = vec![(FIELD_SYMBOL, "000660".to_string())];
        for i in 0..DEPTH_LEVELS {
            overrides.push((FIELD_ASKS + i, (1000 + i).to_string()));
            overrides.push((FIELD_BIDS + i, (900 - i).to_string()));
            overrides.push((FIELD_ASK_DEPTHS + i, (10 + i).to_string()));
            overrides.push((FIELD_BID_DEPTHS + i, (20 + i).to_string()));
        }
        let overrides: Vec<(usize, &str)> =
            overrides.iter().map(|(i, v)| (*i, v.as_str())).collect();
        let raw = format!("0|H0STASP0|001|{}", payload(50, &overrides));

        let events = decoder.decode_at(&raw, NOW);
        assert_eq!(events.len(), 1);
        let MarketEvent::Orderbook(book) = &events[0] else {
            panic!("expected order book");
        };

        assert_eq!(book.symbol, "000660");
        assert_eq!(book.ask_prices[0], 1000);
        assert_eq!(book.ask_prices[9], 1009);
        assert_eq!(book.bid_prices[0], 900);
        assert_eq!(book.bid_prices[9], 891);
        assert_eq!(book.ask_volumes, [10, 11, 12, 13, 14, 15, 16, 17, 18, 19]);
        assert_eq!(book.bid_volumes[9], 29);
        assert_eq!(book.price, 900);
        assert_eq!(book.volume, 0);
    }

    #[test]
    fn test_orderbook_reference_price_falls_back_to_ask() {
        let decoder = FrameDecoder::new();
        let raw = format!(
            "0|H0STASP0|001|{}",
            payload(50, &[(FIELD_ASKS, "1500"), (FIELD_BIDS, "0")])
        );

        let events = decoder.decode_at(&raw, NOW);
        assert_eq!(events[0].price(), 1500);
    }

    #[test]
    fn test_orderbook_short_payload_dropped() {
        let decoder = FrameDecoder::new();
        let raw = format!("0|H0STASP0|001|{}", payload(49, &[]));
        assert!(decoder.decode_at(&raw, NOW).is_empty());
    }

    #[test]
    fn test_too_few_segments_dropped() {
        let decoder = FrameDecoder::new();
        assert!(decoder.decode_at("0|H0STCNT1|001", NOW).is_empty());
        assert!(decoder.decode_at("|", NOW).is_empty());
        assert_eq!(decoder.stats().skipped(), 2);
    }

    #[test]
    fn test_unknown_tag_dropped() {
        let decoder = FrameDecoder::new();
        assert!(decoder
            .decode_at("0|H0XXXXX0|001|a^b^c", NOW)
            .is_empty());
    }

    #[test]
    fn test_garbage_dropped() {
        let decoder = FrameDecoder::new();
        assert!(decoder.decode_at("", NOW).is_empty());
        assert!(decoder.decode_at("hello", NOW).is_empty());
        assert!(decoder.decode_at("[1,2,3]", NOW).is_empty());
    }

    #[test]
    fn test_heartbeat_dropped() {
        let decoder = FrameDecoder::new();
        let raw = json!({"header": {"tr_id": "PINGPONG", "datetime": "20240101093000"}}).to_string();
        assert!(decoder.decode_at(&raw, NOW).is_empty());
    }

    #[test]
    fn test_subscribe_ack_dropped() {
        let decoder = FrameDecoder::new();
        let raw = json!({
            "header": {"tr_id": "H0STCNT0", "tr_key": "005930", "encrypt": "N"},
            "body": {"rt_cd": "0", "msg_cd": "OPSP0000", "msg1": "SUBSCRIBE SUCCESS"}
        })
        .to_string();
        assert!(decoder.decode_at(&raw, NOW).is_empty());
    }

    #[test]
    fn test_rejected_control_frame_dropped() {
        let decoder = FrameDecoder::new();
        let raw = json!({
            "header": {"tr_id": "H0STCNT0"},
            "body": {"rt_cd": "1", "msg_cd": "OPSP0011", "msg1": "invalid approval"}
        })
        .to_string();
        assert!(decoder.decode_at(&raw, NOW).is_empty());
    }

    #[test]
    fn test_structured_snapshot() {
        let decoder = FrameDecoder::new();
        let raw = json!({
            "header": {"tr_id": "FHKST01010100"},
            "body": {
                "symbol": "005930",
                "stck_prpr": "70100",
                "acml_vol": 1234,
                "askp1": "70200",
                "bidp1": 70000,
                "bidp10": "oops"
            }
        })
        .to_string();

        let events = decoder.decode_at(&raw, NOW);
        assert_eq!(events.len(), 1);
        let MarketEvent::PriceSnapshot(snapshot) = &events[0] else {
            panic!("expected snapshot");
        };
        assert_eq!(snapshot.symbol, "005930");
        assert_eq!(snapshot.price, 70100);
        assert_eq!(snapshot.volume, 1234);
        assert_eq!(snapshot.ask_prices[0], 70200);
        assert_eq!(snapshot.ask_prices[1], 0);
        assert_eq!(snapshot.bid_prices[0], 70000);
        assert_eq!(snapshot.bid_prices[9], 0);
        assert_eq!(snapshot.timestamp_ms, NOW);
    }

    #[test]
    fn test_structured_without_symbol_dropped() {
        let decoder = FrameDecoder::new();
        let raw = json!({"header": {"tr_id": "X"}, "body": {"symbol": ""}}).to_string();
        assert!(decoder.decode_at(&raw, NOW).is_empty());
    }

    #[test]
    fn test_decode_stamps_receipt_time() {
        let decoder = FrameDecoder::new();
        let before = Utc::now().timestamp_millis();
        let raw = format!("0|H0STCNT1|001|{}", trade_payload("70000", "10", "B"));

        let events = decoder.decode(&raw);
        assert!(events[0].timestamp_ms() >= before);
        assert_eq!(decoder.stats().events(), 1);
    }
}
