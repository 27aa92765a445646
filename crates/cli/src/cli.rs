//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// GVIO Sync - GNSS/visual/inertial measurement synchronization pipeline
#[derive(Parser, Debug)]
#[command(
    name = "gvio-sync",
    author,
    version,
    about = "GNSS/visual/inertial measurement synchronization pipeline",
    long_about = "Buffers IMU, feature and satellite streams, aligns the local clock to GNSS \n\
                  time, groups measurements into per-image bundles for the estimator and \n\
                  publishes IMU-rate pose predictions to the configured sinks."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "GVIO_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "GVIO_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the synchronization pipeline against simulated sensors
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "config.toml", env = "GVIO_CONFIG")]
    pub config: PathBuf,

    /// Force GNSS fusion on, overriding the configuration
    #[arg(long, conflicts_with = "no_gnss")]
    pub gnss: bool,

    /// Force GNSS fusion off, overriding the configuration
    #[arg(long)]
    pub no_gnss: bool,

    /// Maximum number of bundles to process (0 = unlimited)
    #[arg(long, default_value = "0", env = "GVIO_MAX_BUNDLES")]
    pub max_bundles: u64,

    /// Pipeline timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "GVIO_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,

    /// Capacity of the output event channel
    #[arg(long, default_value = "1024", env = "GVIO_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "GVIO_METRICS_PORT")]
    pub metrics_port: u16,

    /// Simulation speed multiplier (1.0 = real time)
    #[arg(long, default_value = "1.0", env = "GVIO_TIME_SCALE")]
    pub time_scale: f64,
}

impl RunArgs {
    /// GNSS override requested on the command line, if any
    pub fn gnss_override(&self) -> Option<bool> {
        match (self.gnss, self.no_gnss) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show simulated sensor rates
    #[arg(long)]
    pub sensors: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
