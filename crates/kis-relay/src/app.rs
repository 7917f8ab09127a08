//! Main application orchestration.
//!
//! Owns the task tree:
//! - WebSocket supervisor (read loop, decoding inline)
//! - Resubscriber reacting to new sessions
//! - Dispatcher worker feeding the HTTP sinks
//! - Control server (foreground)
//!
//! Every task observes a child of one root `CancellationToken`.

use crate::config::RelayConfig;
use crate::error::AppResult;
use crate::pipeline::FeedPipeline;
use kis_auth::{AuthClient, FileTokenStore, TokenIssuer, TokenManager};
use kis_control::{run_server, ControlState};
use kis_core::AppCredentials;
use kis_dispatch::{dispatch_channel, HttpSink};
use kis_feed::FrameDecoder;
use kis_ws::{ConnectionManager, SubscriptionRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long background tasks get to finish after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Main application.
pub struct Application {
    config: RelayConfig,
}

impl Application {
    pub fn new(config: RelayConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        let cancel = CancellationToken::new();

        let signal = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
            signal.cancel();
        });

        self.run_until(cancel).await
    }

    /// Run until `cancel` fires or the control server stops.
    pub async fn run_until(self, cancel: CancellationToken) -> AppResult<()> {
        let config = self.config;
        info!(
            environment = %config.environment,
            ws_url = %config.websocket_url(),
            control = %config.control.bind_addr(),
            "Starting relay"
        );

        // Token manager
        let credentials = AppCredentials::new(&config.app_key, &config.app_secret);
        let issuer: Arc<dyn TokenIssuer> = match &config.auth_url {
            Some(url) => Arc::new(AuthClient::with_base_url(url)?),
            None => Arc::new(AuthClient::new()?),
        };
        let store = Arc::new(FileTokenStore::new(&config.token_cache_dir));
        info!(dir = %store.dir().display(), "Token cache directory");
        let tokens = Arc::new(TokenManager::new(credentials.clone(), issuer, store));

        // Dispatcher
        let snapshot_sink = Arc::new(HttpSink::new(
            "snapshot",
            &config.sinks.snapshot_url,
            config.sinks.timeout(),
        )?);
        let execution_sink = Arc::new(HttpSink::new(
            "execution",
            &config.sinks.execution_url,
            config.sinks.timeout(),
        )?);
        info!(
            snapshot = snapshot_sink.url(),
            execution = execution_sink.url(),
            "Forwarding events to sinks"
        );
        let (dispatch, worker) =
            dispatch_channel(&config.dispatch_config(), snapshot_sink, execution_sink);

        // Connection and registry
        let pipeline = Arc::new(FeedPipeline::new(FrameDecoder::new(), dispatch));
        let connection = Arc::new(ConnectionManager::new(
            config.connection_config(),
            pipeline,
            cancel.child_token(),
        ));
        let registry = Arc::new(SubscriptionRegistry::new(
            config.registry_config(),
            credentials,
            tokens,
            connection.write_handle(),
        ));

        // Session watchers must exist before the first connect.
        let resubscriber_sessions = connection.session_watch();
        let initial_sessions = connection.session_watch();

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        tasks.push(tokio::spawn(worker.run(cancel.child_token())));
        tasks.push(tokio::spawn(
            registry
                .clone()
                .run_resubscriber(resubscriber_sessions, cancel.child_token()),
        ));
        tasks.push(tokio::spawn(subscribe_initial(
            registry.clone(),
            initial_sessions,
            config.initial_symbols.clone(),
            cancel.child_token(),
        )));
        {
            let connection = connection.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = connection.connect().await {
                    error!(error = %e, "WebSocket supervisor gave up, shutting down");
                    cancel.cancel();
                }
            }));
        }

        let result = run_server(
            config.control.clone(),
            ControlState::new(registry),
            cancel.child_token(),
        )
        .await;

        // Server exits on cancellation or a bind failure; either way stop the rest.
        cancel.cancel();
        for task in tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Task ended abnormally"),
                Err(_) => warn!("Task did not stop within the grace period"),
            }
        }

        info!("Relay stopped");
        result.map_err(Into::into)
    }
}

/// Subscribe configured symbols once the first session opens.
async fn subscribe_initial(
    registry: Arc<SubscriptionRegistry>,
    mut sessions: watch::Receiver<u64>,
    symbols: Vec<String>,
    cancel: CancellationToken,
) {
    if symbols.is_empty() {
        return;
    }

    tokio::select! {
        () = cancel.cancelled() => return,
        changed = sessions.changed() => {
            if changed.is_err() {
                return;
            }
        }
    }

    for symbol in &symbols {
        if cancel.is_cancelled() {
            return;
        }
        match registry.subscribe(symbol).await {
            Ok(_) => info!(%symbol, "Initial subscription registered"),
            Err(e) => warn!(%symbol, error = %e, "Initial subscription failed"),
        }
    }
}
