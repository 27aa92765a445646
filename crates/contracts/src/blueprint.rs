//! FusionBlueprint - Config Loader 输出
//!
//! 描述完整的运行配置：GNSS 融合、缓冲区、估计器参数、仿真源、输出路由。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    BufferConfig, ClockCalibration, SatelliteWaitPolicy, SyncEngineConfig,
    DEFAULT_MAX_GNSS_CAMERA_DELAY,
};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的运行配置蓝图
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FusionBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// GNSS 融合与时钟同步
    #[serde(default)]
    pub gnss: GnssConfig,

    /// 输入缓冲区
    #[serde(default)]
    pub buffer: BufferConfig,

    /// 参考估计器参数
    #[serde(default)]
    pub estimator: EstimatorConfig,

    /// 仿真传感器源
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// 输出路由配置
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

/// GNSS 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GnssConfig {
    /// 是否融合卫星观测
    #[serde(default)]
    pub enabled: bool,

    /// 在线时钟同步 (PPS + 本地触发)；false 时使用 local_time_diff
    #[serde(default = "default_true")]
    pub online_sync: bool,

    /// 静态本地->GNSS 时钟偏移 (秒)
    #[serde(default)]
    pub local_time_diff: f64,

    /// GNSS 与图像关联容差 (秒)
    #[serde(default = "default_max_camera_delay")]
    pub max_camera_delay: f64,

    /// 无卫星数据时的等待策略
    #[serde(default)]
    pub satellite_wait: SatelliteWaitPolicy,
}

impl Default for GnssConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            online_sync: true,
            local_time_diff: 0.0,
            max_camera_delay: DEFAULT_MAX_GNSS_CAMERA_DELAY,
            satellite_wait: SatelliteWaitPolicy::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_camera_delay() -> f64 {
    DEFAULT_MAX_GNSS_CAMERA_DELAY
}

/// 参考估计器参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// 重力加速度模长 (m/s^2)
    #[serde(default = "default_gravity")]
    pub gravity: f64,

    /// 相机-IMU 时间偏移 td (秒)
    #[serde(default)]
    pub td: f64,

    /// 求解器就绪前需要的图像帧数
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: usize,

    /// 滑动窗口大小 (关键帧数)
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// 相机在 body 系下的位置 (m)
    #[serde(default)]
    pub camera_translation: [f64; 3],
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            gravity: default_gravity(),
            td: 0.0,
            warmup_frames: default_warmup_frames(),
            window_size: default_window_size(),
            camera_translation: [0.0; 3],
        }
    }
}

fn default_gravity() -> f64 {
    9.81
}

fn default_warmup_frames() -> usize {
    10
}

fn default_window_size() -> usize {
    10
}

/// 仿真传感器源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_imu_hz")]
    pub imu_hz: f64,

    #[serde(default = "default_camera_hz")]
    pub camera_hz: f64,

    #[serde(default = "default_gnss_hz")]
    pub gnss_hz: f64,

    #[serde(default = "default_pps_hz")]
    pub pps_hz: f64,

    /// 仿真的本地->GNSS 真实时钟偏移 (秒)
    #[serde(default = "default_clock_offset")]
    pub clock_offset: f64,

    /// 每帧特征点数
    #[serde(default = "default_features_per_frame")]
    pub features_per_frame: usize,

    /// 每历元卫星数
    #[serde(default = "default_satellites_per_epoch")]
    pub satellites_per_epoch: usize,

    /// IMU 噪声幅值
    #[serde(default = "default_imu_noise")]
    pub imu_noise: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            imu_hz: default_imu_hz(),
            camera_hz: default_camera_hz(),
            gnss_hz: default_gnss_hz(),
            pps_hz: default_pps_hz(),
            clock_offset: default_clock_offset(),
            features_per_frame: default_features_per_frame(),
            satellites_per_epoch: default_satellites_per_epoch(),
            imu_noise: default_imu_noise(),
        }
    }
}

fn default_imu_hz() -> f64 {
    200.0
}

fn default_camera_hz() -> f64 {
    20.0
}

fn default_gnss_hz() -> f64 {
    10.0
}

fn default_pps_hz() -> f64 {
    1.0
}

fn default_clock_offset() -> f64 {
    18.0
}

fn default_features_per_frame() -> usize {
    40
}

fn default_satellites_per_epoch() -> usize {
    8
}

fn default_imu_noise() -> f64 {
    0.01
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// JSON Lines 文件输出
    File,
}

impl FusionBlueprint {
    /// Build the runtime SyncEngineConfig
    pub fn to_sync_engine_config(&self) -> SyncEngineConfig {
        let clock = if self.gnss.online_sync {
            ClockCalibration::Online
        } else {
            ClockCalibration::Static {
                offset: self.gnss.local_time_diff,
            }
        };

        SyncEngineConfig {
            gnss_enabled: self.gnss.enabled,
            clock,
            max_gnss_camera_delay: self.gnss.max_camera_delay,
            satellite_wait: self.gnss.satellite_wait,
            buffer: self.buffer.clone(),
        }
    }
}
