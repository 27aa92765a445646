//! Pipeline orchestrator - coordinates all components.
//!
//! Simulated sources feed a [`FusionNode`] through the ingestion pipeline,
//! a blocking consumer task drives the estimator, and output events flow
//! through a [`ChannelPublisher`] into the dispatcher.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use contracts::{FusionBlueprint, SensorSource};
use dispatcher::ChannelPublisher;
use ingestion::{IngestionPipeline, MockSensorSource, SimClock};
use observability::FusionMetricsAggregator;
use sync_engine::{DeadReckoningBackend, FusionNode};
use tracing::{info, warn};

use super::PipelineStats;
use crate::error::CliError;

/// How long the dispatcher gets to drain after the sources stop
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The fusion blueprint configuration
    pub blueprint: FusionBlueprint,

    /// Maximum number of bundles to process (None = unlimited)
    pub max_bundles: Option<u64>,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Output event channel capacity
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// Simulation speed multiplier
    pub time_scale: f64,
}

type Node = FusionNode<DeadReckoningBackend, Arc<ChannelPublisher>>;

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until `max_bundles`, the timeout, or `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Dispatcher
        if blueprint.sinks.is_empty() {
            warn!("No sinks configured - output events will be dropped");
        }
        let (publisher, event_rx) = ChannelPublisher::channel(self.config.buffer_size);
        let publisher = Arc::new(publisher);
        let dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone(), event_rx)
            .await
            .context("Failed to create dispatcher")?;
        let active_sinks = blueprint.sinks.len();
        let dispatcher_handle = dispatcher.spawn();
        info!(active_sinks, "Dispatcher started");

        // Fusion node
        let node: Node = FusionNode::new(
            blueprint.to_sync_engine_config(),
            DeadReckoningBackend::new(blueprint.estimator.clone()),
            Arc::clone(&publisher),
        );

        // Simulated sources
        let mut ingestion = IngestionPipeline::new(Arc::new(node.clone()));
        for source in build_sources(blueprint, self.sim_clock()) {
            ingestion
                .register_source(source)
                .context("Failed to register sensor source")?;
        }
        let active_sources = ingestion.source_count();
        info!(active_sources, "Ingestion pipeline configured");

        ingestion.start_all();
        let mut consumer = spawn_consumer(node.clone(), self.config.max_bundles);
        info!(max_bundles = ?self.config.max_bundles, "Pipeline running");

        let timeout = async {
            match self.config.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        let finished = tokio::select! {
            joined = &mut consumer => Some(joined),
            _ = timeout => {
                warn!(timeout_secs = ?self.config.timeout.map(|t| t.as_secs_f64()), "Pipeline timed out");
                None
            }
            _ = shutdown => None,
        };

        // Shutdown
        info!("Shutting down pipeline...");
        node.shutdown();
        let joined = match finished {
            Some(joined) => joined,
            None => consumer.await,
        };
        let fusion =
            joined.map_err(|e| CliError::pipeline_execution(format!("consumer task: {e}")))?;

        ingestion.stop_all();
        let measurements = ingestion.metrics().snapshot();
        let sync = node.sync_stats();
        let clock_offset = node.clock_offset();
        let final_state = node.predictor_state();
        let events_published = publisher.published();
        let events_dropped = publisher.dropped();

        // Every publisher clone must go before the dispatcher sees end of input
        drop(ingestion);
        drop(node);
        drop(publisher);

        let sink_metrics =
            match tokio::time::timeout(DISPATCHER_DRAIN_TIMEOUT, dispatcher_handle).await {
                Ok(Ok(metrics)) => metrics,
                Ok(Err(e)) => {
                    warn!(error = %CliError::shutdown(e.to_string()), "Dispatcher task failed");
                    Vec::new()
                }
                Err(_) => {
                    warn!(
                        error = %CliError::shutdown("dispatcher did not drain in time"),
                        "Dispatcher drain timed out"
                    );
                    Vec::new()
                }
            };

        let stats = PipelineStats {
            bundles_processed: fusion.total_bundles,
            measurements,
            duration: start_time.elapsed(),
            active_sources,
            active_sinks,
            events_published,
            events_dropped,
            sync,
            clock_offset,
            final_state,
            fusion,
            sink_metrics,
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            rate = format!("{:.2}", stats.bundle_rate()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }

    /// Local clock anchored at the current Unix time
    fn sim_clock(&self) -> SimClock {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        SimClock::new(now, self.config.blueprint.simulation.clock_offset)
            .with_time_scale(self.config.time_scale)
    }
}

/// Sources for the configured channels: IMU and camera always, GNSS when
/// fused, PPS only when the clock is calibrated online.
fn build_sources(blueprint: &FusionBlueprint, clock: SimClock) -> Vec<Box<dyn SensorSource>> {
    let sim = &blueprint.simulation;
    let mut sources: Vec<Box<dyn SensorSource>> = vec![
        Box::new(MockSensorSource::imu(
            "imu",
            clock,
            sim.imu_hz,
            blueprint.estimator.gravity,
            sim.imu_noise,
        )),
        Box::new(MockSensorSource::features(
            "camera",
            clock,
            sim.camera_hz,
            sim.features_per_frame,
        )),
    ];

    if blueprint.gnss.enabled {
        sources.push(Box::new(MockSensorSource::gnss(
            "gnss",
            clock,
            sim.gnss_hz,
            sim.satellites_per_epoch,
        )));
        if blueprint.gnss.online_sync {
            sources.push(Box::new(MockSensorSource::pps("pps", clock, sim.pps_hz)));
        }
    }

    sources
}

/// Blocking consumer: wait for bundles and hand them to the estimator
fn spawn_consumer(
    node: Node,
    max_bundles: Option<u64>,
) -> tokio::task::JoinHandle<FusionMetricsAggregator> {
    tokio::task::spawn_blocking(move || {
        let mut aggregator = FusionMetricsAggregator::new();
        while let Some(bundle) = node.next_bundle() {
            let Some(stats) = node.process_bundle(bundle) else {
                continue;
            };
            aggregator.update(&stats);

            if max_bundles.is_some_and(|max| aggregator.total_bundles >= max) {
                info!(bundles = aggregator.total_bundles, "Reached max bundles limit");
                break;
            }
        }
        aggregator
    })
}
