//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Generate `FusionBlueprint`
//! - Apply environment overrides (`GVIO_*`)
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("config.toml")).unwrap();
//! println!("GNSS fusion: {}", blueprint.gnss.enabled);
//! ```

mod parser;
mod validator;

pub use contracts::FusionBlueprint;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<FusionBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<FusionBlueprint, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Apply `GVIO_*` environment overrides, then re-validate
    ///
    /// Recognized keys: `GVIO_GNSS_ENABLED`, `GVIO_LOCAL_TIME_DIFF`,
    /// `GVIO_MAX_CAMERA_DELAY`.
    pub fn apply_env_overrides(
        mut blueprint: FusionBlueprint,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<FusionBlueprint, ContractError> {
        if let Some(value) = lookup("GVIO_GNSS_ENABLED") {
            blueprint.gnss.enabled = parse_env("GVIO_GNSS_ENABLED", &value)?;
        }
        if let Some(value) = lookup("GVIO_LOCAL_TIME_DIFF") {
            blueprint.gnss.local_time_diff = parse_env("GVIO_LOCAL_TIME_DIFF", &value)?;
            blueprint.gnss.online_sync = false;
        }
        if let Some(value) = lookup("GVIO_MAX_CAMERA_DELAY") {
            blueprint.gnss.max_camera_delay = parse_env("GVIO_MAX_CAMERA_DELAY", &value)?;
        }
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Serialize FusionBlueprint to TOML string
    pub fn to_toml(blueprint: &FusionBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize FusionBlueprint to JSON string
    pub fn to_json(blueprint: &FusionBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<FusionBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ContractError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ContractError::config_validation(key, format!("invalid value '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const MINIMAL_TOML: &str = r#"
[gnss]
enabled = true
online_sync = true
max_camera_delay = 0.05

[buffer]
max_size = 500

[estimator]
gravity = 9.81
warmup_frames = 5

[simulation]
imu_hz = 200.0
camera_hz = 20.0
gnss_hz = 10.0

[[sinks]]
name = "log_sink"
sink_type = "log"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert!(bp.gnss.enabled);
        assert_eq!(bp.buffer.max_size, 500);
        assert_eq!(bp.estimator.warmup_frames, 5);
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.gnss.enabled, bp2.gnss.enabled);
        assert_eq!(bp.sinks.len(), bp2.sinks.len());
        assert_eq!(bp.sinks[0].name, bp2.sinks[0].name);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.simulation.camera_hz, bp2.simulation.camera_hz);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[gnss]
max_camera_delay = -1.0
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_camera_delay"));
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(MINIMAL_TOML.as_bytes()).unwrap();

        let bp = ConfigLoader::load_from_path(file.path()).unwrap();
        assert!(bp.gnss.enabled);

        let other = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(ConfigLoader::load_from_path(other.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let env: HashMap<&str, &str> = [
            ("GVIO_GNSS_ENABLED", "false"),
            ("GVIO_LOCAL_TIME_DIFF", "17.5"),
        ]
        .into_iter()
        .collect();

        let bp = ConfigLoader::apply_env_overrides(bp, |k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert!(!bp.gnss.enabled);
        assert!(!bp.gnss.online_sync);
        assert_eq!(bp.gnss.local_time_diff, 17.5);
    }

    #[test]
    fn test_env_override_invalid_value() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let result =
            ConfigLoader::apply_env_overrides(bp, |k| (k == "GVIO_MAX_CAMERA_DELAY").then(|| "abc".into()));
        assert!(result.is_err());
    }
}
