//! Output events - Dispatcher 输入
//!
//! Everything the pipeline publishes: the high-rate predicted pose and the
//! per-bundle backend products.

use nalgebra::{Isometry3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::{ConfirmedState, NavState};

/// Predicted pose published after each inertial sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseStamped {
    pub timestamp: f64,
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub velocity: Vector3<f64>,
}

impl PoseStamped {
    pub fn from_nav(timestamp: f64, nav: &NavState) -> Self {
        Self {
            timestamp,
            position: nav.position,
            orientation: nav.orientation,
            velocity: nav.velocity,
        }
    }
}

/// Keyframe marginalized out of the backend window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeRecord {
    pub timestamp: f64,
    pub pose: Isometry3<f64>,
    pub feature_count: usize,
}

/// Per-bundle timing and content statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleStatistics {
    pub bundle_id: u64,
    pub timestamp: f64,
    /// Backend processing time for the bundle (ms)
    pub backend_ms: f64,
    pub imu_count: usize,
    pub feature_count: usize,
    pub satellite_count: usize,
    pub solver_ready: bool,
    pub accel_bias: Vector3<f64>,
    pub gyro_bias: Vector3<f64>,
}

/// Backend products used for publishing after an image step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorSnapshot {
    pub state: ConfirmedState,
    /// Positions of the key poses in the sliding window
    pub key_positions: Vec<Vector3<f64>>,
    /// Body -> camera extrinsic
    pub body_to_camera: Isometry3<f64>,
    pub map_points: Vec<Vector3<f64>>,
    pub keyframe: Option<KeyframeRecord>,
}

/// Published event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum OutputEvent {
    LatestPose(PoseStamped),
    Odometry(PoseStamped),
    KeyPoses {
        timestamp: f64,
        positions: Vec<Vector3<f64>>,
    },
    CameraPose {
        timestamp: f64,
        pose: Isometry3<f64>,
    },
    PointCloud {
        timestamp: f64,
        points: Vec<Vector3<f64>>,
    },
    Transform {
        timestamp: f64,
        world_from_body: Isometry3<f64>,
    },
    Keyframe(KeyframeRecord),
    Statistics(BundleStatistics),
}

impl OutputEvent {
    pub fn timestamp(&self) -> f64 {
        match self {
            Self::LatestPose(p) | Self::Odometry(p) => p.timestamp,
            Self::KeyPoses { timestamp, .. }
            | Self::CameraPose { timestamp, .. }
            | Self::PointCloud { timestamp, .. }
            | Self::Transform { timestamp, .. } => *timestamp,
            Self::Keyframe(k) => k.timestamp,
            Self::Statistics(s) => s.timestamp,
        }
    }

    /// Every topic name, in declaration order
    pub const TOPICS: [&'static str; 8] = [
        "latest_pose",
        "odometry",
        "key_poses",
        "camera_pose",
        "point_cloud",
        "transform",
        "keyframe",
        "statistics",
    ];

    /// Topic name used for routing and file naming
    pub fn topic(&self) -> &'static str {
        match self {
            Self::LatestPose(_) => "latest_pose",
            Self::Odometry(_) => "odometry",
            Self::KeyPoses { .. } => "key_poses",
            Self::CameraPose { .. } => "camera_pose",
            Self::PointCloud { .. } => "point_cloud",
            Self::Transform { .. } => "transform",
            Self::Keyframe(_) => "keyframe",
            Self::Statistics(_) => "statistics",
        }
    }
}

/// Synchronous publish interface used by the pipeline threads.
///
/// Implementations must not block for long: publishing happens while the
/// backend-busy lock or the producer thread is held.
pub trait OutputSink: Send + Sync {
    fn publish(&self, event: OutputEvent);
}

impl<T: OutputSink + ?Sized> OutputSink for std::sync::Arc<T> {
    fn publish(&self, event: OutputEvent) {
        (**self).publish(event)
    }
}
