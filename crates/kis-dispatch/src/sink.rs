//! Downstream sinks.

use crate::error::{DispatchError, DispatchResult};
use kis_core::{BoxFuture, MarketEvent};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Destination for market events.
pub trait EventSink: Send + Sync {
    /// Short name for logs and metrics labels.
    fn name(&self) -> &str;

    fn deliver<'a>(&'a self, event: &'a MarketEvent) -> BoxFuture<'a, DispatchResult<()>>;
}

/// POSTs each event as JSON to a fixed URL.
pub struct HttpSink {
    name: String,
    url: String,
    client: Client,
}

impl HttpSink {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> DispatchResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, event: &MarketEvent) -> DispatchResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout {
                        sink: self.name.clone(),
                    }
                } else {
                    DispatchError::Request {
                        sink: self.name.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::HttpStatus {
                sink: self.name.clone(),
                status: status.as_u16(),
            });
        }

        debug!(
            sink = %self.name,
            symbol = event.symbol(),
            price = event.price(),
            "Event delivered"
        );
        Ok(())
    }
}

impl EventSink for HttpSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver<'a>(&'a self, event: &'a MarketEvent) -> BoxFuture<'a, DispatchResult<()>> {
        Box::pin(self.post(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use kis_core::{Execution, Side};
    use serde_json::Value;
    use std::sync::Arc;

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn execution() -> MarketEvent {
        MarketEvent::Execution(Execution {
            symbol: "005930".to_string(),
            price: 70000,
            volume: 10,
            side: Side::Sell,
            display_time: "09:30:15".to_string(),
            timestamp_ms: 1,
        })
    }

    #[tokio::test]
    async fn test_http_sink_posts_payload() {
        let received = Arc::new(parking_lot::Mutex::new(Vec::<Value>::new()));
        let received_clone = received.clone();
        let router = Router::new().route(
            "/execution",
            post(move |Json(body): Json<Value>| {
                let received = received_clone.clone();
                async move {
                    received.lock().push(body);
                    StatusCode::OK
                }
            }),
        );
        let base = spawn_server(router).await;

        let sink = HttpSink::new("execution", format!("{base}/execution"), Duration::from_secs(5)).unwrap();
        assert_eq!(sink.url(), format!("{base}/execution"));
        sink.deliver(&execution()).await.unwrap();

        let bodies = received.lock().clone();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["ticker"], "005930");
        assert_eq!(bodies[0]["tradeType"], "SELL");
        assert_eq!(bodies[0]["time"], "09:30:15");
    }

    #[tokio::test]
    async fn test_http_sink_non_2xx() {
        let router = Router::new().route(
            "/snapshot",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = spawn_server(router).await;

        let sink = HttpSink::new("snapshot", format!("{base}/snapshot"), Duration::from_secs(5)).unwrap();
        let err = sink.deliver(&execution()).await.unwrap_err();
        assert!(matches!(err, DispatchError::HttpStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_http_sink_timeout() {
        let router = Router::new().route(
            "/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                StatusCode::OK
            }),
        );
        let base = spawn_server(router).await;

        let sink = HttpSink::new("slow", format!("{base}/slow"), Duration::from_millis(100)).unwrap();
        let err = sink.deliver(&execution()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Timeout { .. }));
    }
}
