//! Per-channel ingestion counters

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::SensorChannel;

const CHANNELS: [SensorChannel; 8] = [
    SensorChannel::Imu,
    SensorChannel::Features,
    SensorChannel::Satellites,
    SensorChannel::Ephemeris,
    SensorChannel::Ionosphere,
    SensorChannel::TimePulse,
    SensorChannel::LocalTrigger,
    SensorChannel::Restart,
];

fn slot(channel: SensorChannel) -> usize {
    match channel {
        SensorChannel::Imu => 0,
        SensorChannel::Features => 1,
        SensorChannel::Satellites => 2,
        SensorChannel::Ephemeris => 3,
        SensorChannel::Ionosphere => 4,
        SensorChannel::TimePulse => 5,
        SensorChannel::LocalTrigger => 6,
        SensorChannel::Restart => 7,
    }
}

/// Ingestion metrics
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Messages received, per channel
    received: [AtomicU64; 8],

    /// Messages dropped because the pipeline was stopped
    dropped: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record message received
    pub fn record_received(&self, channel: SensorChannel) {
        self.received[slot(channel)].fetch_add(1, Ordering::Relaxed);
        observability::record_measurement_received(channel.as_str());
    }

    /// Record message dropped
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn received(&self, channel: SensorChannel) -> u64 {
        self.received[slot(channel)].load(Ordering::Relaxed)
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: CHANNELS
                .iter()
                .map(|&channel| (channel, self.received(channel)))
                .filter(|(_, count)| *count > 0)
                .collect(),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Non-zero per-channel receive counts, in channel order
    pub received: Vec<(SensorChannel, u64)>,

    /// Messages dropped while stopped
    pub dropped: u64,
}

impl MetricsSnapshot {
    pub fn total_received(&self) -> u64 {
        self.received.iter().map(|(_, count)| count).sum()
    }

    pub fn received(&self, channel: SensorChannel) -> u64 {
        self.received
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}
