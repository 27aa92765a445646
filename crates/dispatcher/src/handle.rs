//! SinkHandle - manages a sink with isolated queue and worker task

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{DataSink, OutputEvent};

use crate::metrics::SinkMetrics;

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Channel to send events to worker
    tx: mpsc::Sender<OutputEvent>,
    /// Topics this sink subscribes to (`None` = all)
    topics: Option<HashSet<&'static str>>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: DataSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity);
        let metrics = Arc::new(SinkMetrics::new(name.clone()));

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            topics: None,
            metrics,
            worker_handle,
        }
    }

    /// Restrict the sink to the given topics
    pub fn with_topics(mut self, topics: impl IntoIterator<Item = &'static str>) -> Self {
        self.topics = Some(topics.into_iter().collect());
        self
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    pub fn accepts(&self, event: &OutputEvent) -> bool {
        self.topics
            .as_ref()
            .is_none_or(|topics| topics.contains(event.topic()))
    }

    /// Send an event to the sink (non-blocking)
    ///
    /// Returns true if sent, false if filtered out or the queue is full (event dropped)
    pub fn try_send(&self, event: OutputEvent) -> bool {
        if !self.accepts(&event) {
            self.metrics.record_filtered();
            return false;
        }
        match self.tx.try_send(event) {
            Ok(()) => {
                // Update queue length approximation
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(e)) => {
                self.metrics.record_dropped();
                warn!(
                    sink = %self.name,
                    topic = e.topic(),
                    timestamp = e.timestamp(),
                    "Queue full, event dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Shutdown the sink worker gracefully
    #[instrument(name = "sink_handle_shutdown", skip(self))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        // Wait for worker to finish
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

/// Worker task that consumes events and writes to sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<OutputEvent>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(event) = rx.recv().await {
        // Update queue length
        metrics.set_queue_len(rx.len());

        match sink.write(&event).await {
            Ok(()) => {
                metrics.record_write(&event);
            }
            Err(e) => {
                metrics.record_failure();
                error!(
                    sink = %name,
                    topic = event.topic(),
                    error = %e,
                    "Write failed"
                );
                // Continue processing - don't crash on single failure
            }
        }
    }

    // Cleanup
    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}
