//! Sync engine configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};

/// Default GNSS/camera association tolerance (seconds)
pub const DEFAULT_MAX_GNSS_CAMERA_DELAY: f64 = 0.05;

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEngineConfig {
    /// Fuse satellite observations
    #[serde(default)]
    pub gnss_enabled: bool,

    /// How the local -> GNSS clock offset is obtained
    #[serde(default)]
    pub clock: ClockCalibration,

    /// Max |gnss - image| for a batch to be associated with an image (seconds)
    #[serde(default = "default_max_gnss_camera_delay")]
    pub max_gnss_camera_delay: f64,

    /// Behaviour when fusion is enabled but no satellite batch is buffered
    #[serde(default)]
    pub satellite_wait: SatelliteWaitPolicy,

    /// Buffer configuration
    #[serde(default)]
    pub buffer: BufferConfig,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            gnss_enabled: false,
            clock: ClockCalibration::default(),
            max_gnss_camera_delay: DEFAULT_MAX_GNSS_CAMERA_DELAY,
            satellite_wait: SatelliteWaitPolicy::default(),
            buffer: BufferConfig::default(),
        }
    }
}

fn default_max_gnss_camera_delay() -> f64 {
    DEFAULT_MAX_GNSS_CAMERA_DELAY
}

/// Clock offset calibration mode
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ClockCalibration {
    /// Derive the offset from time pulses and local triggers
    #[default]
    Online,
    /// Fixed offset, valid from startup
    Static { offset: f64 },
}

/// Satellite starvation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SatelliteWaitPolicy {
    /// Hold images until a satellite batch is buffered
    #[default]
    Block,
    /// Bundle images without satellites when none are buffered
    ProceedWithoutSatellites,
}

/// Buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Maximum number of buffered items per input queue
    pub max_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { max_size: 2000 }
    }
}
