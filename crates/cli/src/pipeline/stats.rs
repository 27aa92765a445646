//! Pipeline statistics and metrics.

use std::time::Duration;

use observability::FusionMetricsAggregator;
use sync_engine::{PredictorState, SyncStats};

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Bundles processed by the estimator
    pub bundles_processed: u64,

    /// Per-channel ingestion counts
    pub measurements: ingestion::MetricsSnapshot,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Number of sources that were registered
    pub active_sources: usize,

    /// Number of sinks that received data
    pub active_sinks: usize,

    /// Output events accepted by the dispatcher channel
    pub events_published: u64,

    /// Output events dropped on a full dispatcher channel
    pub events_dropped: u64,

    /// Synchronizer counters
    pub sync: SyncStats,

    /// Local to GNSS clock offset at shutdown
    pub clock_offset: Option<f64>,

    /// High-rate prediction at shutdown
    pub final_state: PredictorState,

    /// Per-bundle aggregate
    pub fusion: FusionMetricsAggregator,

    /// Final per-sink metrics
    pub sink_metrics: Vec<(String, dispatcher::MetricsSnapshot)>,
}

impl PipelineStats {
    /// Bundles per wall-clock second
    pub fn bundle_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.bundles_processed as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Output events dropped, as a percentage of all published
    pub fn event_drop_rate(&self) -> f64 {
        let total = self.events_published + self.events_dropped;
        if total > 0 {
            (self.events_dropped as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n+--------------------------------------------------------------+");
        println!("|                    Pipeline Statistics                       |");
        println!("+--------------------------------------------------------------+\n");

        println!("Overview");
        println!("   |- Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   |- Bundles processed: {}", self.bundles_processed);
        println!("   |- Bundle rate: {:.2}/s", self.bundle_rate());
        println!("   |- Active sources: {}", self.active_sources);
        println!("   `- Active sinks: {}", self.active_sinks);

        println!("\nIngestion");
        for (channel, count) in &self.measurements.received {
            println!("   |- {}: {}", channel, count);
        }
        println!("   `- Dropped after stop: {}", self.measurements.dropped);

        println!("\nSynchronizer");
        println!("   |- Bundles emitted: {}", self.sync.bundles);
        println!("   |- Inertial waits: {}", self.sync.waits);
        println!("   |- Stale images dropped: {}", self.sync.images_dropped);
        println!("   |- Satellite batches matched: {}", self.sync.batches_matched);
        println!("   |- Satellite batches dropped: {}", self.sync.batches_dropped);
        match self.clock_offset {
            Some(offset) => println!("   `- Clock offset: {:.6}s", offset),
            None => println!("   `- Clock offset: (not calibrated)"),
        }

        println!("\n{}", self.fusion.summary());

        let p = &self.final_state.nav.position;
        println!("Prediction");
        match self.final_state.latest_time {
            Some(t) => println!("   |- Latest time: {:.3}", t),
            None => println!("   |- Latest time: (none)"),
        }
        println!("   `- Position: [{:.3}, {:.3}, {:.3}]", p.x, p.y, p.z);

        println!("\nOutput");
        println!("   |- Events published: {}", self.events_published);
        println!(
            "   `- Events dropped: {} ({:.2}%)",
            self.events_dropped,
            self.event_drop_rate()
        );
        for (name, metrics) in &self.sink_metrics {
            println!(
                "      - {}: written={} failed={} dropped={} filtered={}",
                name,
                metrics.write_count,
                metrics.failure_count,
                metrics.dropped_count,
                metrics.filtered_count
            );
            for (topic, count) in &metrics.per_topic {
                println!("          {}: {}", topic, count);
            }
        }

        println!();
    }
}
