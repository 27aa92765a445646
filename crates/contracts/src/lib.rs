//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Inertial and feature stamps are local sensor-clock seconds (f64)
//! - Satellite stamps are GPS time on the Unix-epoch scale
//! - `local + clock_offset = gnss`

mod backend;
mod blueprint;
mod error;
mod gnss_time;
mod measurement;
mod output;
mod sensor_source;
mod sink;
mod state;
mod sync_engine_config;

pub use backend::EstimatorBackend;
pub use blueprint::*;
pub use error::*;
pub use gnss_time::*;
pub use measurement::*;
pub use output::*;
pub use sensor_source::{
    MeasurementHandler, SensorChannel, SensorDataCallback, SensorMessage, SensorSource,
};
pub use sink::*;
pub use state::*;
pub use sync_engine_config::*;
