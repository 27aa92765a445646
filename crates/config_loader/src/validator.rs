//! 配置校验模块
//!
//! 校验规则：
//! - GNSS 关联容差 > 0 且有限
//! - 静态时钟偏移有限
//! - 缓冲区深度 > 0
//! - 仿真源频率 > 0，相机频率不高于 IMU 频率
//! - 估计器参数合法
//! - sink 名称非空且唯一

use std::collections::HashSet;

use contracts::{ContractError, FusionBlueprint, SinkType};

/// 校验 FusionBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &FusionBlueprint) -> Result<(), ContractError> {
    validate_gnss(blueprint)?;
    validate_buffer(blueprint)?;
    validate_estimator(blueprint)?;
    validate_simulation(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// 校验 GNSS 配置
fn validate_gnss(blueprint: &FusionBlueprint) -> Result<(), ContractError> {
    let gnss = &blueprint.gnss;

    if !(gnss.max_camera_delay > 0.0 && gnss.max_camera_delay.is_finite()) {
        return Err(ContractError::config_validation(
            "gnss.max_camera_delay",
            format!(
                "max_camera_delay must be a positive number of seconds, got {}",
                gnss.max_camera_delay
            ),
        ));
    }

    if !gnss.local_time_diff.is_finite() {
        return Err(ContractError::config_validation(
            "gnss.local_time_diff",
            "local_time_diff must be finite",
        ));
    }

    Ok(())
}

/// 校验缓冲区配置
fn validate_buffer(blueprint: &FusionBlueprint) -> Result<(), ContractError> {
    if blueprint.buffer.max_size == 0 {
        return Err(ContractError::config_validation(
            "buffer.max_size",
            "max_size must be > 0",
        ));
    }
    Ok(())
}

/// 校验估计器参数
fn validate_estimator(blueprint: &FusionBlueprint) -> Result<(), ContractError> {
    let estimator = &blueprint.estimator;

    if !(estimator.gravity > 0.0 && estimator.gravity.is_finite()) {
        return Err(ContractError::config_validation(
            "estimator.gravity",
            format!("gravity must be > 0, got {}", estimator.gravity),
        ));
    }

    if !estimator.td.is_finite() {
        return Err(ContractError::config_validation(
            "estimator.td",
            "td must be finite",
        ));
    }

    if estimator.window_size == 0 {
        return Err(ContractError::config_validation(
            "estimator.window_size",
            "window_size must be > 0",
        ));
    }

    Ok(())
}

/// 校验仿真源频率
fn validate_simulation(blueprint: &FusionBlueprint) -> Result<(), ContractError> {
    let sim = &blueprint.simulation;

    for (field, value) in [
        ("simulation.imu_hz", sim.imu_hz),
        ("simulation.camera_hz", sim.camera_hz),
        ("simulation.gnss_hz", sim.gnss_hz),
        ("simulation.pps_hz", sim.pps_hz),
    ] {
        if value <= 0.0 {
            return Err(ContractError::config_validation(
                field,
                format!("frequency must be > 0, got {value}"),
            ));
        }
    }

    // 每帧图像必须被 IMU 样本包围
    if sim.camera_hz > sim.imu_hz {
        return Err(ContractError::config_validation(
            "simulation.camera_hz / simulation.imu_hz",
            format!(
                "camera_hz ({}) must be <= imu_hz ({})",
                sim.camera_hz, sim.imu_hz
            ),
        ));
    }

    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &FusionBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", idx),
                "queue_capacity must be > 0",
            ));
        }
        if sink.sink_type == SinkType::File && !sink.params.contains_key("path") {
            return Err(ContractError::config_validation(
                format!("sinks[{}].params.path", idx),
                "file sink requires a 'path' parameter",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        BufferConfig, ConfigVersion, EstimatorConfig, GnssConfig, SimulationConfig, SinkConfig,
    };

    fn minimal_blueprint() -> FusionBlueprint {
        FusionBlueprint {
            version: ConfigVersion::V1,
            gnss: GnssConfig::default(),
            buffer: BufferConfig::default(),
            estimator: EstimatorConfig::default(),
            simulation: SimulationConfig::default(),
            sinks: vec![SinkConfig {
                name: "log".into(),
                sink_type: SinkType::Log,
                queue_capacity: 100,
                params: Default::default(),
            }],
        }
    }

    #[test]
    fn test_valid_config() {
        let bp = minimal_blueprint();
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_non_positive_tolerance() {
        let mut bp = minimal_blueprint();
        bp.gnss.max_camera_delay = 0.0;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("max_camera_delay"));
    }

    #[test]
    fn test_zero_buffer() {
        let mut bp = minimal_blueprint();
        bp.buffer.max_size = 0;
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_camera_faster_than_imu() {
        let mut bp = minimal_blueprint();
        bp.simulation.camera_hz = 500.0;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("camera_hz"));
    }

    #[test]
    fn test_duplicate_sink_name() {
        let mut bp = minimal_blueprint();
        bp.sinks.push(bp.sinks[0].clone());
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_file_sink_requires_path() {
        let mut bp = minimal_blueprint();
        bp.sinks[0].sink_type = SinkType::File;
        assert!(validate(&bp).is_err());

        bp.sinks[0]
            .params
            .insert("path".into(), "/tmp/gvio".into());
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_nan_static_offset() {
        let mut bp = minimal_blueprint();
        bp.gnss.local_time_diff = f64::NAN;
        assert!(validate(&bp).is_err());
    }
}
