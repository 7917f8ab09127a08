//! WebSocket connection supervisor.
//!
//! Owns the socket for one environment. Runs the read loop, writes queued
//! frames, answers pings and reconnects with a fixed delay until cancelled.

use crate::error::{WsError, WsResult};
use crate::ws_write_handle::{WsOutbound, WsWriteHandle};
use futures_util::{SinkExt, StreamExt};
use kis_telemetry::Metrics;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex as TokioMutex};
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outbound queue depth. Senders wait for their ack, so this only needs
/// to cover concurrent callers.
const OUTBOUND_CAPACITY: usize = 100;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Fixed delay between a disconnect and the next attempt.
    pub reconnect_delay_ms: u64,
    /// Maximum consecutive failed attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Upper bound on the TCP, TLS and upgrade handshake of one attempt.
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_delay_ms: 5000,
            max_reconnect_attempts: 0, // Infinite
            connect_timeout_ms: 10_000,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives every inbound text payload, synchronously, on the read loop.
///
/// Implementations must not block; hand heavy work to a queue.
pub trait InboundHandler: Send + Sync {
    fn on_text(&self, text: &str);
}

/// WebSocket connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    handler: Arc<dyn InboundHandler>,
    /// Session counter, bumped on every transition to `Open`.
    session_tx: watch::Sender<u64>,
    /// Outbound frame sender (for WsWriteHandle).
    outbound_tx: mpsc::Sender<WsOutbound>,
    /// Outbound frame receiver (consumed by the message loop).
    outbound_rx: TokioMutex<mpsc::Receiver<WsOutbound>>,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        handler: Arc<dyn InboundHandler>,
        shutdown_token: CancellationToken,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (session_tx, _) = watch::channel(0);
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            handler,
            session_tx,
            outbound_tx,
            outbound_rx: TokioMutex::new(outbound_rx),
            shutdown_token,
        }
    }

    /// Get a write handle for sending frames.
    pub fn write_handle(&self) -> WsWriteHandle {
        WsWriteHandle::new(
            self.outbound_tx.clone(),
            self.state.clone(),
            self.session_tx.subscribe(),
        )
    }

    /// Watch the session counter; every change is a freshly opened socket.
    pub fn session_watch(&self) -> watch::Receiver<u64> {
        self.session_tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Signal graceful shutdown.
    pub fn shutdown(&self) {
        info!("ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        Metrics::ws_state_set(state.as_str());
    }

    /// Connect and supervise the socket until cancelled.
    ///
    /// Returns `Err` only when `max_reconnect_attempts` is exhausted.
    pub async fn connect(&self) -> WsResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting connect loop");
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);
            let session_before = *self.session_tx.borrow();

            let reason = match self.try_connect().await {
                Ok(()) => {
                    info!("WebSocket connection closed");
                    "closed"
                }
                Err(e) => {
                    error!(error = %e, "WebSocket connection error");
                    "error"
                }
            };

            if self.is_shutdown() {
                self.fail_pending().await;
                info!("Shutdown requested after disconnect, not reconnecting");
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Closed);
            self.fail_pending().await;

            // A session that reached Open resets the failure streak.
            if *self.session_tx.borrow() != session_before {
                attempt = 0;
            }
            attempt += 1;

            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max reconnection attempts reached");
                self.set_state(ConnectionState::Disconnected);
                return Err(WsError::ConnectionFailed(
                    "Max reconnection attempts reached".to_string(),
                ));
            }

            Metrics::ws_reconnect(reason);
            let delay = Duration::from_millis(self.config.reconnect_delay_ms);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to WebSocket");

        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let connect = tokio::time::timeout(
            connect_timeout,
            connect_async_tls_with_config(&self.config.url, None, true, None),
        );
        let (ws_stream, _response) = tokio::select! {
            result = connect => match result {
                Ok(connected) => connected?,
                Err(_) => {
                    return Err(WsError::ConnectionFailed(format!(
                        "connect timed out after {}ms",
                        connect_timeout.as_millis()
                    )));
                }
            },
            () = self.shutdown_token.cancelled() => return Ok(()),
        };
        let (mut write, mut read) = ws_stream.split();

        self.set_state(ConnectionState::Open);
        self.session_tx.send_modify(|session| *session += 1);
        let session = *self.session_tx.borrow();
        info!(session, "WebSocket connected");

        loop {
            let outbound_recv = async { self.outbound_rx.lock().await.recv().await };

            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handler.on_text(&text);
                        }
                        Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                            Ok(text) => self.handler.on_text(&text),
                            Err(e) => warn!(error = %e, "Dropping non-UTF-8 binary frame"),
                        },
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                outbound = outbound_recv => {
                    let Some(mut outbound) = outbound else { continue };

                    if outbound.session != session {
                        debug!(tr_id = outbound.tr_id, "Dropping frame queued for a previous session");
                        outbound.complete(Err(WsError::ConnectionUnavailable));
                        continue;
                    }

                    let tr_id = outbound.tr_id;
                    let frame = std::mem::take(&mut outbound.frame);
                    match write.send(Message::Text(frame)).await {
                        Ok(()) => {
                            Metrics::ws_frame_sent(tr_id);
                            debug!(tr_id, "Frame written");
                            outbound.complete(Ok(()));
                        }
                        Err(e) => {
                            outbound.complete(Err(WsError::SendFailed(e.to_string())));
                            return Err(e.into());
                        }
                    }
                }
            }
        }
    }

    /// Fail every frame still waiting in the outbound queue.
    async fn fail_pending(&self) {
        let mut rx = self.outbound_rx.lock().await;
        let mut failed = 0usize;
        while let Ok(outbound) = rx.try_recv() {
            outbound.complete(Err(WsError::ConnectionUnavailable));
            failed += 1;
        }
        if failed > 0 {
            warn!(failed, "Failed frames queued on a dropped connection");
        }
    }
}
