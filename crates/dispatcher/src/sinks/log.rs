//! LogSink - logs event summaries via tracing

use contracts::{ContractError, DataSink, OutputEvent};
use tracing::{debug, info, instrument};

/// Sink that logs output summaries for debugging
///
/// Statistics are logged at info level; pose topics at debug to keep the
/// IMU-rate stream out of default logs.
pub struct LogSink {
    name: String,
    events: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: 0,
        }
    }

    fn log_event_summary(&self, event: &OutputEvent) {
        match event {
            OutputEvent::Statistics(stats) => info!(
                sink = %self.name,
                bundle_id = stats.bundle_id,
                timestamp = stats.timestamp,
                backend_ms = stats.backend_ms,
                imu = stats.imu_count,
                features = stats.feature_count,
                satellites = stats.satellite_count,
                solver_ready = stats.solver_ready,
                "bundle statistics"
            ),
            OutputEvent::Odometry(pose) | OutputEvent::LatestPose(pose) => debug!(
                sink = %self.name,
                topic = event.topic(),
                timestamp = pose.timestamp,
                x = pose.position.x,
                y = pose.position.y,
                z = pose.position.z,
                "pose"
            ),
            other => debug!(
                sink = %self.name,
                topic = other.topic(),
                timestamp = other.timestamp(),
                "output event"
            ),
        }
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        level = "trace",
        name = "log_sink_write",
        skip(self, event),
        fields(sink = %self.name, topic = event.topic())
    )]
    async fn write(&mut self, event: &OutputEvent) -> Result<(), ContractError> {
        self.events += 1;
        self.log_event_summary(event);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, events = self.events, "LogSink closed");
        Ok(())
    }
}
