//! Navigation state shared between the backend and the high-rate predictor.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Kinematic state of the body frame in the world frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavState {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub velocity: Vector3<f64>,
    pub accel_bias: Vector3<f64>,
    pub gyro_bias: Vector3<f64>,
}

impl Default for NavState {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            velocity: Vector3::zeros(),
            accel_bias: Vector3::zeros(),
            gyro_bias: Vector3::zeros(),
        }
    }
}

impl NavState {
    /// World <- body pose
    pub fn pose(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.position), self.orientation)
    }
}

/// State confirmed by the backend at the end of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedState {
    /// Image timestamp this state belongs to
    pub timestamp: f64,
    pub nav: NavState,
    /// Last raw inertial sample the backend integrated
    pub last_accel: Vector3<f64>,
    pub last_gyro: Vector3<f64>,
    /// Backend has left initialization and runs its nonlinear solver
    pub solver_ready: bool,
}

impl Default for ConfirmedState {
    fn default() -> Self {
        Self {
            timestamp: 0.0,
            nav: NavState::default(),
            last_accel: Vector3::zeros(),
            last_gyro: Vector3::zeros(),
            solver_ready: false,
        }
    }
}
