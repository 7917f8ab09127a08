//! Subscription registry.
//!
//! Tracks which symbols are registered for real-time data and emits the
//! subscribe frames for them. Subscribe calls are serialized by an async
//! gate, so a duplicate subscribe racing the first never reaches the wire.
//! The symbol map itself sits behind a `parking_lot::RwLock` and is never
//! held across an await.

use crate::connection::ConnectionState;
use crate::error::{RegistryError, RegistryResult, WsError};
use crate::message::SubscribeRequest;
use crate::ws_write_handle::WsWriteHandle;
use kis_auth::TokenSource;
use kis_core::{is_valid_symbol, AppCredentials, Environment, Subscription};
use kis_telemetry::Metrics;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as TokioMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Environment whose token authorizes subscribe frames.
    pub environment: Environment,
    /// Pause after each subscribe frame.
    pub send_delay_ms: u64,
    /// Re-send subscribe frames for every registered symbol after a
    /// reconnect. When false the registry is cleared instead.
    pub resubscribe_on_reconnect: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Mock,
            send_delay_ms: 200,
            resubscribe_on_reconnect: true,
        }
    }
}

/// Registered symbols and the frames that keep them subscribed.
pub struct SubscriptionRegistry {
    config: RegistryConfig,
    credentials: AppCredentials,
    tokens: Arc<dyn TokenSource>,
    writer: WsWriteHandle,
    symbols: RwLock<BTreeMap<String, Subscription>>,
    /// Serializes subscribe and resubscribe passes.
    gate: TokioMutex<()>,
}

impl SubscriptionRegistry {
    pub fn new(
        config: RegistryConfig,
        credentials: AppCredentials,
        tokens: Arc<dyn TokenSource>,
        writer: WsWriteHandle,
    ) -> Self {
        Self {
            config,
            credentials,
            tokens,
            writer,
            symbols: RwLock::new(BTreeMap::new()),
            gate: TokioMutex::new(()),
        }
    }

    /// Register `symbol` for trade and order book data.
    ///
    /// Returns `Ok(true)` when frames were sent, `Ok(false)` when the symbol
    /// was already registered (no wire traffic). On error the registry is
    /// unchanged.
    pub async fn subscribe(&self, symbol: &str) -> RegistryResult<bool> {
        if !is_valid_symbol(symbol) {
            return Err(RegistryError::InvalidSymbol(symbol.to_string()));
        }

        let _gate = self.gate.lock().await;

        if self.contains(symbol) {
            debug!(symbol, "Already subscribed");
            return Ok(false);
        }

        let subscription = Subscription::all_kinds(symbol);
        self.send_subscribe(&subscription).await?;

        let count = {
            let mut symbols = self.symbols.write();
            symbols.insert(subscription.symbol.clone(), subscription);
            symbols.len()
        };
        Metrics::active_subscriptions(count);
        info!(symbol, count, "Subscribed");

        Ok(true)
    }

    /// Remove `symbol` locally. KIS keeps streaming until the socket closes;
    /// frames for removed symbols are still decoded and forwarded.
    ///
    /// Returns false when the symbol was not registered.
    pub fn unsubscribe(&self, symbol: &str) -> bool {
        let (removed, count) = {
            let mut symbols = self.symbols.write();
            let removed = symbols.remove(symbol).is_some();
            (removed, symbols.len())
        };

        if removed {
            Metrics::active_subscriptions(count);
            info!(symbol, count, "Unsubscribed");
        }
        removed
    }

    /// Sorted snapshot of registered symbols.
    pub fn list(&self) -> Vec<String> {
        self.symbols.read().keys().cloned().collect()
    }

    /// Snapshot of registered subscriptions with their stream kinds.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.symbols.read().values().cloned().collect()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.read().contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.read().is_empty()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.writer.state()
    }

    pub fn environment(&self) -> Environment {
        self.config.environment
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.symbols.write().clear();
        Metrics::active_subscriptions(0);
    }

    /// Re-send subscribe frames for every registered symbol.
    ///
    /// Symbols whose frames cannot be delivered are dropped from the
    /// registry. Returns the number of symbols kept.
    pub async fn resubscribe_all(&self) -> usize {
        let _gate = self.gate.lock().await;
        self.resubscribe_locked().await
    }

    /// Caller holds the gate.
    async fn resubscribe_locked(&self) -> usize {
        let subscriptions = self.subscriptions();
        if subscriptions.is_empty() {
            return 0;
        }
        info!(count = subscriptions.len(), "Resubscribing after reconnect");

        let mut kept = 0usize;
        for subscription in subscriptions {
            match self.send_subscribe(&subscription).await {
                Ok(()) => kept += 1,
                Err(e) => {
                    let symbol = &subscription.symbol;
                    warn!(%symbol, error = %e, "Resubscribe failed, dropping symbol");
                    self.symbols.write().remove(symbol);
                }
            }
        }

        Metrics::active_subscriptions(self.len());
        kept
    }

    /// Apply the reconnect policy every time a new session opens.
    ///
    /// `sessions` should be freshly subscribed: the value current at that
    /// point is treated as already handled. Runs until cancelled or the
    /// connection manager is dropped.
    pub async fn run_resubscriber(
        self: Arc<Self>,
        mut sessions: watch::Receiver<u64>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = sessions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let session = *sessions.borrow_and_update();
                    self.on_new_session(session).await;
                }
            }
        }
        debug!("Resubscriber stopped");
    }

    /// Runs under the gate so a subscribe still in flight when the session
    /// changed is finished, and therefore covered, before the pass starts.
    async fn on_new_session(&self, session: u64) {
        let _gate = self.gate.lock().await;

        if self.is_empty() {
            return;
        }

        if self.config.resubscribe_on_reconnect {
            let kept = self.resubscribe_locked().await;
            info!(session, kept, "Resubscription pass complete");
        } else {
            let dropped = self.len();
            self.clear();
            warn!(session, dropped, "Registry cleared after reconnect");
        }
    }

    /// Acquire a token and send one frame per stream kind, pausing after each.
    async fn send_subscribe(&self, subscription: &Subscription) -> RegistryResult<()> {
        let token = self.tokens.acquire(self.config.environment).await?;
        let delay = Duration::from_millis(self.config.send_delay_ms);
        let symbol = subscription.symbol.as_str();

        for &kind in &subscription.kinds {
            let request = SubscribeRequest::new(&token, &self.credentials, kind, symbol);
            let frame = request.to_frame().map_err(WsError::from)?;
            self.writer.send(frame, kind.tr_id()).await?;
            debug!(symbol, tr_id = kind.tr_id(), "Subscribe frame sent");
            tokio::time::sleep(delay).await;
        }

        Ok(())
    }
}
