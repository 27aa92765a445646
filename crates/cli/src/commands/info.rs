//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::FusionBlueprint;

use super::validate::source_count;
use crate::cli::InfoArgs;
use crate::error::ensure_config_exists;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    gnss: GnssInfo,
    buffer_max_size: usize,
    estimator: EstimatorInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sources: Vec<SourceInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct GnssInfo {
    enabled: bool,
    clock: String,
    max_camera_delay: f64,
    satellite_wait: String,
}

#[derive(Serialize)]
struct EstimatorInfo {
    gravity: f64,
    td: f64,
    warmup_frames: usize,
    window_size: usize,
}

#[derive(Serialize)]
struct SourceInfo {
    id: &'static str,
    channel: &'static str,
    frequency_hz: f64,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    topics: Option<String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    ensure_config_exists(&args.config)?;

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn clock_description(blueprint: &FusionBlueprint) -> String {
    if blueprint.gnss.online_sync {
        "online".to_string()
    } else {
        format!("static({:.6})", blueprint.gnss.local_time_diff)
    }
}

/// Simulated sources in registration order
fn sources(blueprint: &FusionBlueprint) -> Vec<SourceInfo> {
    let sim = &blueprint.simulation;
    let mut sources = vec![
        SourceInfo {
            id: "imu",
            channel: "imu",
            frequency_hz: sim.imu_hz,
        },
        SourceInfo {
            id: "camera",
            channel: "features",
            frequency_hz: sim.camera_hz,
        },
    ];
    if blueprint.gnss.enabled {
        sources.push(SourceInfo {
            id: "gnss",
            channel: "satellites",
            frequency_hz: sim.gnss_hz,
        });
        if blueprint.gnss.online_sync {
            sources.push(SourceInfo {
                id: "pps",
                channel: "time_pulse",
                frequency_hz: sim.pps_hz,
            });
        }
    }
    debug_assert_eq!(sources.len(), source_count(blueprint));
    sources
}

fn build_config_info(blueprint: &FusionBlueprint, args: &InfoArgs) -> ConfigInfo {
    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
                topics: s.params.get("topics").cloned(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        gnss: GnssInfo {
            enabled: blueprint.gnss.enabled,
            clock: clock_description(blueprint),
            max_camera_delay: blueprint.gnss.max_camera_delay,
            satellite_wait: format!("{:?}", blueprint.gnss.satellite_wait),
        },
        buffer_max_size: blueprint.buffer.max_size,
        estimator: EstimatorInfo {
            gravity: blueprint.estimator.gravity,
            td: blueprint.estimator.td,
            warmup_frames: blueprint.estimator.warmup_frames,
            window_size: blueprint.estimator.window_size,
        },
        sources: if args.sensors {
            sources(blueprint)
        } else {
            Vec::new()
        },
        sinks,
    }
}

fn print_config_info(blueprint: &FusionBlueprint, args: &InfoArgs) {
    println!("+--------------------------------------------------------------+");
    println!("|                 GVIO Sync Configuration                      |");
    println!("+--------------------------------------------------------------+\n");

    println!("GNSS");
    println!("   |- Version: {:?}", blueprint.version);
    println!("   |- Enabled: {}", blueprint.gnss.enabled);
    println!("   |- Clock: {}", clock_description(blueprint));
    println!(
        "   |- Camera association tolerance: {:.3}s",
        blueprint.gnss.max_camera_delay
    );
    println!("   `- Satellite wait: {:?}", blueprint.gnss.satellite_wait);

    let est = &blueprint.estimator;
    println!("\nEstimator");
    println!("   |- Gravity: {} m/s^2", est.gravity);
    println!("   |- td: {}s", est.td);
    println!("   |- Warmup frames: {}", est.warmup_frames);
    println!("   `- Window size: {}", est.window_size);

    println!("\nBuffers");
    println!("   `- Max size per channel: {}", blueprint.buffer.max_size);

    let sources = sources(blueprint);
    println!("\nSources ({})", sources.len());
    if args.sensors {
        for (i, source) in sources.iter().enumerate() {
            let prefix = if i == sources.len() - 1 { "`-" } else { "|-" };
            println!(
                "   {} {} ({}, {} Hz)",
                prefix, source.id, source.channel, source.frequency_hz
            );
        }
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({})", blueprint.sinks.len());
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            let prefix = if i == blueprint.sinks.len() - 1 { "`-" } else { "|-" };
            match (args.sinks, sink.params.get("topics")) {
                (true, Some(topics)) => {
                    println!("   {} {} ({:?}) topics={}", prefix, sink.name, sink.sink_type, topics)
                }
                _ => println!("   {} {} ({:?})", prefix, sink.name, sink.sink_type),
            }
        }
    }

    println!();
}
