//! EstimatorBackend trait - the nonlinear estimator the pipeline feeds.
//!
//! The pipeline never inspects optimization internals; it only drives the
//! backend through these steps and reads back the confirmed state.

use nalgebra::Vector3;

use crate::{ConfirmedState, Ephemeris, EstimatorSnapshot, FeatureMap, IonoParameters, SatelliteBatch};

/// Backend capability set
///
/// All calls happen under the pipeline's backend-busy lock, so implementations
/// need no internal synchronization.
pub trait EstimatorBackend: Send {
    /// Integrate one inertial step of length `dt` ending at the given sample.
    fn process_inertial(&mut self, dt: f64, accel: &Vector3<f64>, gyro: &Vector3<f64>);

    /// Add a satellite observation batch matched to the upcoming image.
    fn process_satellites(&mut self, batch: &SatelliteBatch);

    /// Add the visual bundle and run the estimator, returning the confirmed state.
    fn process_image(&mut self, features: &FeatureMap, timestamp: f64) -> ConfirmedState;

    /// Drop all estimator state.
    fn clear_state(&mut self);

    /// Re-apply the configured parameters after a clear.
    fn set_parameter(&mut self);

    /// Latest confirmed state.
    fn confirmed_state(&self) -> ConfirmedState;

    /// Estimated camera-to-IMU time offset `td` (seconds).
    fn camera_imu_time_offset(&self) -> f64;

    /// Gravity vector in the world frame.
    fn gravity(&self) -> Vector3<f64>;

    /// Products to publish after an image step.
    fn snapshot(&self) -> EstimatorSnapshot;

    /// Local -> GNSS clock offset became known or changed.
    fn input_clock_offset(&mut self, _offset: f64) {}

    fn input_ephemeris(&mut self, _ephemeris: &Ephemeris) {}

    fn input_iono_params(&mut self, _params: &IonoParameters) {}
}
