//! Measurement types - Ingestion 输出
//!
//! 惯性、视觉特征、卫星观测三路输入的数据结构。时间戳统一为秒 (f64)。

use std::collections::BTreeMap;

use nalgebra::{SVector, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::ContractError;

/// 带时间戳的测量（用于缓冲区排序）
pub trait Timestamped {
    /// 测量时间戳 (seconds)
    fn timestamp(&self) -> f64;
}

/// 惯性测量样本
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// 本地时钟时间戳 (seconds)
    pub timestamp: f64,

    /// 线加速度 (m/s^2, body frame)
    pub accel: Vector3<f64>,

    /// 角速度 (rad/s, body frame)
    pub gyro: Vector3<f64>,
}

impl ImuSample {
    pub fn new(timestamp: f64, accel: Vector3<f64>, gyro: Vector3<f64>) -> Self {
        Self {
            timestamp,
            accel,
            gyro,
        }
    }
}

impl Timestamped for ImuSample {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

/// 单个特征点观测
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureObservation {
    /// 特征 ID（跨帧一致）
    pub feature_id: u32,

    /// 相机 ID
    pub camera_id: u8,

    /// 归一化平面坐标 (z 必须为 1)
    pub point: Vector3<f64>,

    /// 像素坐标
    pub pixel: Vector2<f64>,

    /// 像素速度
    pub velocity: Vector2<f64>,
}

/// Packed observation: `[x, y, z, u, v, vx, vy]`
pub type PackedObservation = SVector<f64, 7>;

/// Feature id -> per-camera packed observations, ordered by feature id
pub type FeatureMap = BTreeMap<u32, Vec<(u8, PackedObservation)>>;

impl FeatureObservation {
    /// Pack into the 7-vector consumed by the backend.
    pub fn packed(&self) -> PackedObservation {
        PackedObservation::from_column_slice(&[
            self.point.x,
            self.point.y,
            self.point.z,
            self.pixel.x,
            self.pixel.y,
            self.velocity.x,
            self.velocity.y,
        ])
    }
}

/// 一帧图像的特征观测集合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    /// 本地时钟时间戳 (seconds)
    pub timestamp: f64,

    /// 按前端输出顺序排列的观测
    pub observations: Vec<FeatureObservation>,
}

impl FeatureFrame {
    pub fn new(timestamp: f64, observations: Vec<FeatureObservation>) -> Self {
        Self {
            timestamp,
            observations,
        }
    }

    /// Group observations by feature id.
    pub fn feature_map(&self) -> FeatureMap {
        let mut map = FeatureMap::new();
        for obs in &self.observations {
            map.entry(obs.feature_id)
                .or_default()
                .push((obs.camera_id, obs.packed()));
        }
        map
    }

    /// Reject observations whose ray is not on the normalized image plane.
    pub fn validate(&self) -> Result<(), ContractError> {
        for obs in &self.observations {
            if (obs.point.z - 1.0).abs() > 1e-9 {
                return Err(ContractError::malformed_input(
                    "features",
                    format!(
                        "feature {} has z = {} (expected normalized ray)",
                        obs.feature_id, obs.point.z
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl Timestamped for FeatureFrame {
    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

/// GNSS 星座
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constellation {
    Gps,
    Glonass,
    Galileo,
    Beidou,
}

/// 单颗卫星的原始观测
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SatelliteObservation {
    pub constellation: Constellation,
    /// 卫星 PRN / slot
    pub prn: u16,
    /// 伪距 (m)
    pub pseudorange: f64,
    /// 载波相位 (cycles)
    pub carrier_phase: f64,
    /// 多普勒 (Hz)
    pub doppler: f64,
    /// 载噪比 (dB-Hz)
    pub cn0: f64,
}

/// 同一 GNSS 历元的观测批次（整体匹配或整体丢弃）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteBatch {
    /// GPS 时间 (seconds, Unix-epoch scale)
    pub time: f64,

    pub observations: Vec<SatelliteObservation>,
}

impl SatelliteBatch {
    pub fn new(time: f64, observations: Vec<SatelliteObservation>) -> Self {
        Self { time, observations }
    }
}

impl Timestamped for SatelliteBatch {
    fn timestamp(&self) -> f64 {
        self.time
    }
}

/// 广播星历（透传给后端，不解析）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ephemeris {
    pub constellation: Constellation,
    pub prn: u16,
    /// 星历参考时间 (GPST seconds)
    pub toe: f64,
    /// 星历参数
    pub params: Vec<f64>,
}

/// Number of broadcast ionosphere coefficients (alpha0..3, beta0..3).
pub const IONO_PARAM_COUNT: usize = 8;

/// Broadcast ionosphere model parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IonoParameters {
    pub timestamp: f64,
    pub alpha: [f64; 4],
    pub beta: [f64; 4],
}

impl IonoParameters {
    /// Build from a raw coefficient vector.
    ///
    /// # Errors
    /// Returns [`ContractError::MalformedInput`] unless exactly eight values are given.
    pub fn from_values(timestamp: f64, values: &[f64]) -> Result<Self, ContractError> {
        if values.len() != IONO_PARAM_COUNT {
            return Err(ContractError::malformed_input(
                "ionosphere",
                format!(
                    "expected {IONO_PARAM_COUNT} coefficients, got {}",
                    values.len()
                ),
            ));
        }
        let mut alpha = [0.0; 4];
        let mut beta = [0.0; 4];
        alpha.copy_from_slice(&values[..4]);
        beta.copy_from_slice(&values[4..]);
        Ok(Self {
            timestamp,
            alpha,
            beta,
        })
    }
}
