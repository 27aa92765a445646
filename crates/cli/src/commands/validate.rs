//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::FusionBlueprint;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    gnss_enabled: bool,
    online_sync: bool,
    source_count: usize,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    gnss_enabled: blueprint.gnss.enabled,
                    online_sync: blueprint.gnss.online_sync,
                    source_count: source_count(&blueprint),
                    sink_count: blueprint.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Number of simulated sources a run would register
pub(crate) fn source_count(blueprint: &FusionBlueprint) -> usize {
    match (blueprint.gnss.enabled, blueprint.gnss.online_sync) {
        (false, _) => 2,
        (true, false) => 3,
        (true, true) => 4,
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &FusionBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - output events will be dropped".to_string());
    }

    let sim = &blueprint.simulation;
    if sim.camera_hz >= sim.imu_hz {
        warnings.push(format!(
            "simulation.camera_hz ({}) is not below imu_hz ({}) - bundles will carry few inertial samples",
            sim.camera_hz, sim.imu_hz
        ));
    }

    if blueprint.gnss.enabled {
        if !blueprint.gnss.online_sync && blueprint.gnss.local_time_diff == 0.0 {
            warnings.push(
                "gnss.local_time_diff is 0 with online_sync disabled - local clock is assumed to be GNSS time"
                    .to_string(),
            );
        }
        if blueprint.gnss.max_camera_delay * 2.0 > 1.0 / sim.gnss_hz {
            warnings.push(format!(
                "gnss.max_camera_delay ({:.3}s) spans more than half a GNSS period - adjacent batches may both match",
                blueprint.gnss.max_camera_delay
            ));
        }
    }

    if blueprint.estimator.warmup_frames == 0 {
        warnings.push("estimator.warmup_frames is 0 - predictions start from the first image".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("[OK] Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  GNSS enabled: {}", summary.gnss_enabled);
            println!("  Online clock sync: {}", summary.online_sync);
            println!("  Sources: {}", summary.source_count);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n[WARN] Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("[FAIL] Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
