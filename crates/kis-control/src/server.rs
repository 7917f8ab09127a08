//! HTTP server implementation using axum.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use kis_telemetry::Metrics;
use kis_ws::SubscriptionRegistry;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ControlConfig;
use crate::error::{ControlError, ControlResult};

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct ControlState {
    registry: Arc<SubscriptionRegistry>,
}

impl ControlState {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }
}

/// Response to subscribe and unsubscribe calls.
#[derive(Debug, Serialize)]
struct SubscriptionChange {
    success: bool,
    ticker: String,
    subscriptions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubscriptionList {
    subscriptions: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    environment: &'static str,
    connection: &'static str,
    subscriptions: usize,
}

/// Create the axum router.
pub fn create_router(state: ControlState) -> Router {
    Router::new()
        .route("/subscribe/{ticker}", post(subscribe))
        .route("/unsubscribe/{ticker}", post(unsubscribe))
        .route("/subscriptions", get(list_subscriptions))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Register a symbol. Always answers 200; `success` carries the outcome.
async fn subscribe(
    State(state): State<ControlState>,
    Path(ticker): Path<String>,
) -> Json<SubscriptionChange> {
    let (success, error) = match state.registry.subscribe(&ticker).await {
        Ok(_) => (true, None),
        Err(e) => {
            warn!(%ticker, error = %e, "Subscribe failed");
            (false, Some(e.to_string()))
        }
    };

    Json(SubscriptionChange {
        success,
        ticker,
        subscriptions: state.registry.list(),
        error,
    })
}

async fn unsubscribe(
    State(state): State<ControlState>,
    Path(ticker): Path<String>,
) -> Json<SubscriptionChange> {
    let success = state.registry.unsubscribe(&ticker);

    Json(SubscriptionChange {
        success,
        ticker,
        subscriptions: state.registry.list(),
        error: None,
    })
}

async fn list_subscriptions(State(state): State<ControlState>) -> Json<SubscriptionList> {
    Json(SubscriptionList {
        subscriptions: state.registry.list(),
    })
}

async fn health(State(state): State<ControlState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        environment: state.registry.environment().as_str(),
        connection: state.registry.connection_state().as_str(),
        subscriptions: state.registry.len(),
    })
}

async fn metrics() -> Response {
    match Metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Run the control server until `cancel` fires.
pub async fn run_server(
    config: ControlConfig,
    state: ControlState,
    cancel: CancellationToken,
) -> ControlResult<()> {
    let app = create_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ControlError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(%addr, "Starting control server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("Control server stopped");
    Ok(())
}
