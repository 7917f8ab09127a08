//! Prometheus metrics for the KIS relay.
//!
//! Covers:
//! - Connection state and reconnects
//! - Frame decoding (decoded per tag, skipped per reason)
//! - Downstream dispatch outcomes, latency and queue drops
//! - Token refreshes and active subscriptions
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A failure means a
//! duplicate metric name, which is a programming error that should surface
//! on first use at startup.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    register_int_gauge, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, IntGauge,
    TextEncoder,
};

/// WebSocket connection state (1 = open, 0 = not open).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("kis_ws_connected", "WebSocket connection state (1=open)").unwrap()
});

/// Connection state machine current state.
/// Labels: state (disconnected/connecting/open/closed)
pub static WS_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "kis_ws_state",
        "Connection state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Total reconnection attempts.
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "kis_ws_reconnect_total",
        "Total WebSocket reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Outbound frames written to the socket.
pub static WS_FRAMES_SENT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "kis_ws_frames_sent_total",
        "Outbound frames written to the WebSocket",
        &["tr_id"]
    )
    .unwrap()
});

/// Inbound frames that produced at least one event.
pub static FRAMES_DECODED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "kis_frames_decoded_total",
        "Inbound frames decoded into market events",
        &["tag"]
    )
    .unwrap()
});

/// Inbound frames dropped by the decoder.
pub static FRAMES_SKIPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "kis_frames_skipped_total",
        "Inbound frames dropped by the decoder",
        &["reason"]
    )
    .unwrap()
});

/// Dispatch outcomes per sink.
pub static EVENTS_DISPATCHED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "kis_events_dispatched_total",
        "Events forwarded to downstream sinks",
        &["sink", "outcome"]
    )
    .unwrap()
});

/// Downstream call latency in milliseconds.
pub static DISPATCH_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "kis_dispatch_latency_ms",
        "Downstream sink call latency in milliseconds",
        &["sink"],
        vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Events dropped before reaching a sink.
pub static DISPATCH_DROPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "kis_dispatch_dropped_total",
        "Events dropped before dispatch",
        &["reason"]
    )
    .unwrap()
});

/// Token acquisitions that went to the auth endpoint.
pub static TOKEN_REFRESH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "kis_token_refresh_total",
        "Access token refreshes against the auth endpoint",
        &["environment", "outcome"]
    )
    .unwrap()
});

/// Number of registered symbols.
pub static ACTIVE_SUBSCRIPTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "kis_active_subscriptions",
        "Symbols currently registered for real-time data"
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record connection state transition.
    ///
    /// Only the active state is set to 1; `open` also drives `kis_ws_connected`.
    pub fn ws_state_set(state: &str) {
        for s in &["disconnected", "connecting", "open", "closed"] {
            WS_STATE.with_label_values(&[s]).set(0.0);
        }
        WS_STATE.with_label_values(&[state]).set(1.0);
        WS_CONNECTED.set(if state == "open" { 1.0 } else { 0.0 });
    }

    /// Record a reconnection attempt.
    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record an outbound frame.
    pub fn ws_frame_sent(tr_id: &str) {
        WS_FRAMES_SENT_TOTAL.with_label_values(&[tr_id]).inc();
    }

    /// Record a decoded frame.
    pub fn frame_decoded(tag: &str) {
        FRAMES_DECODED_TOTAL.with_label_values(&[tag]).inc();
    }

    /// Record a dropped frame.
    pub fn frame_skipped(reason: &str) {
        FRAMES_SKIPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a sink call outcome and its latency.
    pub fn event_dispatched(sink: &str, outcome: &str, latency_ms: f64) {
        EVENTS_DISPATCHED_TOTAL
            .with_label_values(&[sink, outcome])
            .inc();
        DISPATCH_LATENCY_MS
            .with_label_values(&[sink])
            .observe(latency_ms);
    }

    /// Record an event dropped before dispatch.
    pub fn dispatch_dropped(reason: &str) {
        DISPATCH_DROPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a token refresh.
    pub fn token_refresh(environment: &str, outcome: &str) {
        TOKEN_REFRESH_TOTAL
            .with_label_values(&[environment, outcome])
            .inc();
    }

    /// Update the registered symbol count.
    pub fn active_subscriptions(count: usize) {
        ACTIVE_SUBSCRIPTIONS.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Render every registered metric in Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
