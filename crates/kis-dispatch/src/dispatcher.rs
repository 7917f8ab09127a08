//! Bounded event queue and its worker.

use crate::sink::EventSink;
use kis_core::MarketEvent;
use kis_telemetry::Metrics;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Events buffered between the read loop and the worker.
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// Producer side, held by the read loop.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<MarketEvent>,
}

impl DispatchHandle {
    /// Queue an event without blocking.
    ///
    /// Returns false when the event was dropped (queue full or worker gone).
    pub fn enqueue(&self, event: MarketEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    symbol = event.symbol(),
                    kind = event.kind(),
                    "Dispatch queue full, dropping event"
                );
                Metrics::dispatch_dropped("queue_full");
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!(symbol = event.symbol(), "Dispatcher stopped, dropping event");
                Metrics::dispatch_dropped("closed");
                false
            }
        }
    }
}

/// Consumer side: drains the queue and routes events to their sinks.
pub struct DispatchWorker {
    rx: mpsc::Receiver<MarketEvent>,
    snapshot_sink: Arc<dyn EventSink>,
    execution_sink: Arc<dyn EventSink>,
}

/// Create the queue. Snapshots and order books go to `snapshot_sink`,
/// executions to `execution_sink`.
pub fn dispatch_channel(
    config: &DispatchConfig,
    snapshot_sink: Arc<dyn EventSink>,
    execution_sink: Arc<dyn EventSink>,
) -> (DispatchHandle, DispatchWorker) {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    (
        DispatchHandle { tx },
        DispatchWorker {
            rx,
            snapshot_sink,
            execution_sink,
        },
    )
}

impl DispatchWorker {
    /// Run until cancelled or every handle is dropped.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Dispatcher started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Dispatcher cancelled");
                    break;
                }
                event = self.rx.recv() => {
                    let Some(event) = event else {
                        info!("All dispatch handles dropped");
                        break;
                    };
                    self.dispatch(&event).await;
                }
            }
        }
    }

    async fn dispatch(&self, event: &MarketEvent) {
        let sink = if event.is_execution() {
            &self.execution_sink
        } else {
            &self.snapshot_sink
        };

        let started = Instant::now();
        let result = sink.deliver(event).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(()) => Metrics::event_dispatched(sink.name(), "ok", latency_ms),
            Err(e) => {
                Metrics::event_dispatched(sink.name(), "error", latency_ms);
                warn!(
                    sink = sink.name(),
                    symbol = event.symbol(),
                    error = %e,
                    "Dispatch failed, dropping event"
                );
            }
        }
    }
}
