//! # Ingestion Pipeline
//!
//! Sensor data ingestion module.
//!
//! Responsibilities:
//! - Register sensor data sources behind the `SensorSource` trait
//! - Start/stop every source on its own producer thread
//! - Count messages per channel
//! - Forward every message to one `MeasurementHandler` (the fusion node)
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{IngestionPipeline, MockSensorSource, SimClock};
//!
//! let clock = SimClock::new(local_start, 18.0);
//! let mut pipeline = IngestionPipeline::new(Arc::new(node.clone()));
//! pipeline.register_source(Box::new(MockSensorSource::imu("imu", clock, 200.0, 9.81, 0.01)))?;
//! pipeline.register_source(Box::new(MockSensorSource::pps("pps", clock, 1.0)))?;
//!
//! pipeline.start_all();
//! // ...
//! pipeline.stop_all();
//! ```

mod error;
mod metrics;
mod mock;
mod pipeline;

// Re-exports
pub use error::{IngestionError, Result};
pub use metrics::{IngestionMetrics, MetricsSnapshot};
pub use mock::{MockKind, MockSensorConfig, MockSensorSource, SimClock};
pub use pipeline::IngestionPipeline;
