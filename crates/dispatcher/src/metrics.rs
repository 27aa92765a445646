//! Per-sink delivery counters
//!
//! Writes are counted per output topic so a run summary can show which
//! streams a sink actually received.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use contracts::OutputEvent;

const TOPIC_COUNT: usize = OutputEvent::TOPICS.len();

fn topic_slot(topic: &str) -> Option<usize> {
    OutputEvent::TOPICS.iter().position(|t| *t == topic)
}

/// Metrics for a single sink
#[derive(Debug)]
pub struct SinkMetrics {
    sink_name: String,
    queue_len: AtomicUsize,
    /// Successful writes, indexed like `OutputEvent::TOPICS`
    written: [AtomicU64; TOPIC_COUNT],
    failures: AtomicU64,
    /// Rejected on a full queue
    dropped: AtomicU64,
    /// Skipped by the topic filter
    filtered: AtomicU64,
    /// Timestamp of the newest written event, as f64 bits
    last_timestamp: AtomicU64,
}

impl SinkMetrics {
    pub fn new(sink_name: impl Into<String>) -> Self {
        Self {
            sink_name: sink_name.into(),
            queue_len: AtomicUsize::new(0),
            written: Default::default(),
            failures: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            last_timestamp: AtomicU64::new(f64::NAN.to_bits()),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Record a successful write of `event`
    pub fn record_write(&self, event: &OutputEvent) {
        if let Some(slot) = topic_slot(event.topic()) {
            self.written[slot].fetch_add(1, Ordering::Relaxed);
        }
        self.last_timestamp
            .store(event.timestamp().to_bits(), Ordering::Relaxed);
        observability::record_event_dispatched(&self.sink_name, true);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        observability::record_event_dispatched(&self.sink_name, false);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Total successful writes across topics
    pub fn write_count(&self) -> u64 {
        self.written.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Successful writes for one topic
    pub fn topic_count(&self, topic: &str) -> u64 {
        topic_slot(topic)
            .map(|slot| self.written[slot].load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn filtered_count(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    /// Timestamp of the newest written event
    pub fn last_timestamp(&self) -> Option<f64> {
        let t = f64::from_bits(self.last_timestamp.load(Ordering::Relaxed));
        (!t.is_nan()).then_some(t)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            write_count: self.write_count(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
            filtered_count: self.filtered_count(),
            last_timestamp: self.last_timestamp(),
            per_topic: OutputEvent::TOPICS
                .iter()
                .map(|&topic| (topic, self.topic_count(topic)))
                .filter(|(_, count)| *count > 0)
                .collect(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub write_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
    pub filtered_count: u64,
    pub last_timestamp: Option<f64>,
    /// Non-zero per-topic write counts, in topic order
    pub per_topic: Vec<(&'static str, u64)>,
}
