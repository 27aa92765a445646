//! # Sync Engine
//!
//! GNSS / 视觉 / 惯性测量同步与高频预测。
//!
//! 负责：
//! - 输入缓冲（IMU、特征帧、卫星观测）
//! - 本地时钟与 GNSS 时间对齐
//! - 图像降频以匹配 GNSS 频率
//! - 组装测量包（图像 + IMU 窗口 + 卫星批次）
//! - IMU 频率位姿预测
//!
//! ## 使用示例
//!
//! ```ignore
//! use sync_engine::{DeadReckoningBackend, FusionNode};
//!
//! let node = FusionNode::new(config, DeadReckoningBackend::new(params), sink);
//! let consumer = node.spawn_consumer()?;
//!
//! // producers
//! node.on_imu(sample);
//! node.on_features(frame);
//!
//! node.shutdown();
//! consumer.join();
//! ```

mod backend;
mod buffer;
mod buffers;
mod bundle;
mod clock;
mod decimator;
mod node;
mod predictor;
mod synchronizer;

// Re-exports
pub use backend::DeadReckoningBackend;
pub use buffer::{PushOutcome, TimedQueue};
pub use buffers::{ClearedCounts, IngestBuffers};
pub use bundle::{InertialCursor, InertialStep, MeasurementBundle};
pub use clock::ClockSynchronizer;
pub use decimator::{Admission, RateDecimator};
pub use node::FusionNode;
pub use predictor::{midpoint_step, ImuPredictor, PredictorState};
pub use synchronizer::{BundleStatus, MeasurementSynchronizer, SyncStats, WaitReason};

pub use contracts::{
    BufferConfig, ClockCalibration, SatelliteWaitPolicy, SyncEngineConfig,
};
