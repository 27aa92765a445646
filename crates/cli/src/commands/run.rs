//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use contracts::FusionBlueprint;

use crate::cli::RunArgs;
use crate::error::{ensure_config_exists, CliError};
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let blueprint = load_blueprint(args)?;

    info!(
        gnss_enabled = blueprint.gnss.enabled,
        online_sync = blueprint.gnss.online_sync,
        imu_hz = blueprint.simulation.imu_hz,
        camera_hz = blueprint.simulation.camera_hz,
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        max_bundles: (args.max_bundles > 0).then_some(args.max_bundles),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        buffer_size: args.buffer_size,
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
        time_scale: args.time_scale,
    };

    info!("Starting pipeline...");
    let stats = Pipeline::new(pipeline_config)
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        bundles = stats.bundles_processed,
        duration_secs = stats.duration.as_secs_f64(),
        rate = format!("{:.2}", stats.bundle_rate()),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("GVIO Sync finished");
    Ok(())
}

/// Load the file, then apply `GVIO_*` environment and command-line overrides
fn load_blueprint(args: &RunArgs) -> Result<FusionBlueprint> {
    ensure_config_exists(&args.config)?;

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let mut blueprint =
        config_loader::ConfigLoader::apply_env_overrides(blueprint, |key| std::env::var(key).ok())
            .map_err(|e| CliError::config_load(e.to_string()))?;

    if let Some(enabled) = args.gnss_override() {
        info!(enabled, "Overriding GNSS fusion from CLI");
        blueprint.gnss.enabled = enabled;
    }

    Ok(blueprint)
}

/// Resolve on Ctrl+C or SIGTERM
///
/// A handler that fails to install is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("Received shutdown signal, stopping pipeline...");
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &FusionBlueprint) {
    println!("\n=== Configuration Summary ===\n");

    let gnss = &blueprint.gnss;
    println!("GNSS:");
    println!("  Enabled: {}", gnss.enabled);
    if gnss.online_sync {
        println!("  Clock: online (PPS + local trigger)");
    } else {
        println!("  Clock: static offset {:.6}s", gnss.local_time_diff);
    }
    println!("  Camera association tolerance: {:.3}s", gnss.max_camera_delay);
    println!("  Satellite wait: {:?}", gnss.satellite_wait);

    let sim = &blueprint.simulation;
    println!("\nSimulated sensors:");
    println!("  IMU: {} Hz", sim.imu_hz);
    println!("  Camera: {} Hz ({} features)", sim.camera_hz, sim.features_per_frame);
    if gnss.enabled {
        println!(
            "  GNSS: {} Hz ({} satellites)",
            sim.gnss_hz, sim.satellites_per_epoch
        );
        if gnss.online_sync {
            println!("  PPS: {} Hz", sim.pps_hz);
        }
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
