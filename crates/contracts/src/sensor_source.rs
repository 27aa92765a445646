//! SensorSource trait - Sensor data source abstraction
//!
//! Defines a unified interface for sensor data sources, decoupling the
//! pipeline from concrete drivers. Every source emits on its own thread.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Ephemeris, FeatureFrame, ImuSample, SatelliteBatch, TimePulse};

/// Input channel of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorChannel {
    Imu,
    Features,
    Satellites,
    Ephemeris,
    Ionosphere,
    TimePulse,
    LocalTrigger,
    Restart,
}

impl SensorChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imu => "imu",
            Self::Features => "features",
            Self::Satellites => "satellites",
            Self::Ephemeris => "ephemeris",
            Self::Ionosphere => "ionosphere",
            Self::TimePulse => "time_pulse",
            Self::LocalTrigger => "local_trigger",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message emitted by a sensor source
#[derive(Debug, Clone, PartialEq)]
pub enum SensorMessage {
    Imu(ImuSample),
    Features(FeatureFrame),
    Satellites(SatelliteBatch),
    Ephemeris(Ephemeris),
    /// Raw broadcast ionosphere coefficients, validated on receipt
    IonoParams { timestamp: f64, values: Vec<f64> },
    TimePulse(TimePulse),
    /// Local-clock stamp of the trigger matching the last time pulse
    LocalTrigger { timestamp: f64 },
    Restart(bool),
}

impl SensorMessage {
    pub fn channel(&self) -> SensorChannel {
        match self {
            Self::Imu(_) => SensorChannel::Imu,
            Self::Features(_) => SensorChannel::Features,
            Self::Satellites(_) => SensorChannel::Satellites,
            Self::Ephemeris(_) => SensorChannel::Ephemeris,
            Self::IonoParams { .. } => SensorChannel::Ionosphere,
            Self::TimePulse(_) => SensorChannel::TimePulse,
            Self::LocalTrigger { .. } => SensorChannel::LocalTrigger,
            Self::Restart(_) => SensorChannel::Restart,
        }
    }
}

/// Sensor data callback type
///
/// When a source produces data, it sends a `SensorMessage` through this callback.
/// Uses `Arc` to allow callback sharing across multiple contexts.
pub type SensorDataCallback = Arc<dyn Fn(SensorMessage) + Send + Sync>;

/// Consumer side of the sensor sources
///
/// Implemented by the fusion node; called concurrently from every producer thread.
pub trait MeasurementHandler: Send + Sync {
    fn handle(&self, message: SensorMessage);
}

/// Sensor data source trait
///
/// # Example
///
/// ```ignore
/// let source: Box<dyn SensorSource> = get_sensor_source();
/// source.listen(Arc::new(|message| {
///     println!("Received {}", message.channel());
/// }));
/// // ... use source ...
/// source.stop();
/// ```
pub trait SensorSource: Send + Sync {
    /// Get source ID
    fn source_id(&self) -> &str;

    /// Primary channel this source feeds
    fn channel(&self) -> SensorChannel;

    /// Register data callback
    ///
    /// If already listening, repeated calls are idempotent (won't register multiple callbacks).
    fn listen(&self, callback: SensorDataCallback);

    /// Stop listening and join the producer thread
    fn stop(&self);

    /// Check if currently listening
    fn is_listening(&self) -> bool;
}
