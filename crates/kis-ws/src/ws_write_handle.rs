//! WebSocket write handle for sending frames.
//!
//! Frames travel over a channel to the connection loop, which owns the
//! socket. Each frame carries a oneshot ack, so `send` resolves only after
//! the frame was written (or could not be).

use crate::connection::ConnectionState;
use crate::error::{WsError, WsResult};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

/// Outbound frame queued for the connection loop.
#[derive(Debug)]
pub struct WsOutbound {
    /// Text payload.
    pub frame: String,
    /// Transaction id, for metrics and logs.
    pub tr_id: &'static str,
    /// Session the frame was queued for. Frames from an older session are
    /// never written to a newer socket.
    pub session: u64,
    /// Completion signal.
    pub ack: oneshot::Sender<WsResult<()>>,
}

impl WsOutbound {
    /// Resolve the sender's pending `send`. A sender that gave up is ignored.
    pub fn complete(self, result: WsResult<()>) {
        let _ = self.ack.send(result);
    }
}

/// Write handle for sending frames to the WebSocket.
///
/// Cheap to clone and safe to hold across reconnects.
#[derive(Clone)]
pub struct WsWriteHandle {
    tx: mpsc::Sender<WsOutbound>,
    state: Arc<RwLock<ConnectionState>>,
    session: watch::Receiver<u64>,
}

impl WsWriteHandle {
    pub fn new(
        tx: mpsc::Sender<WsOutbound>,
        state: Arc<RwLock<ConnectionState>>,
        session: watch::Receiver<u64>,
    ) -> Self {
        Self { tx, state, session }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Current session number (bumped on every transition to `Open`).
    pub fn session(&self) -> u64 {
        *self.session.borrow()
    }

    /// Send a text frame and wait until it has been written.
    ///
    /// # Errors
    ///
    /// - `WsError::ConnectionUnavailable`: not open, or the socket dropped
    ///   before the frame was written
    /// - any transport error the write itself produced
    pub async fn send(&self, frame: String, tr_id: &'static str) -> WsResult<()> {
        if !self.is_open() {
            return Err(WsError::ConnectionUnavailable);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        let outbound = WsOutbound {
            frame,
            tr_id,
            session: self.session(),
            ack: ack_tx,
        };

        self.tx
            .send(outbound)
            .await
            .map_err(|_| WsError::ConnectionUnavailable)?;
        debug!(tr_id, "Frame queued for sending");

        ack_rx.await.map_err(|_| WsError::ConnectionUnavailable)?
    }
}
