//! High-rate inertial predictor.
//!
//! Shadows the latest backend-confirmed state and integrates every new
//! inertial sample on top of it, so a pose is available at IMU rate between
//! backend updates. Never feeds back into the backend.

use contracts::{ConfirmedState, ImuSample, NavState};
use nalgebra::{UnitQuaternion, Vector3};

/// Predictor state: navigation state plus midpoint continuity cache
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorState {
    pub nav: NavState,
    /// Reference time of `nav`; `None` until the first sample
    pub latest_time: Option<f64>,
    pub last_accel: Vector3<f64>,
    pub last_gyro: Vector3<f64>,
}

impl Default for PredictorState {
    fn default() -> Self {
        Self {
            nav: NavState::default(),
            latest_time: None,
            last_accel: Vector3::zeros(),
            last_gyro: Vector3::zeros(),
        }
    }
}

/// One midpoint integration step from `(acc_0, gyr_0)` to `(acc_1, gyr_1)`.
///
/// Orientation advances by the exponential map of the averaged bias-corrected
/// rate; position uses the averaged gravity-compensated acceleration with
/// second-order integration.
pub fn midpoint_step(
    nav: &mut NavState,
    gravity: &Vector3<f64>,
    acc_0: &Vector3<f64>,
    gyr_0: &Vector3<f64>,
    acc_1: &Vector3<f64>,
    gyr_1: &Vector3<f64>,
    dt: f64,
) {
    let un_acc_0 = nav.orientation * (acc_0 - nav.accel_bias) - gravity;
    let un_gyr = 0.5 * (gyr_0 + gyr_1) - nav.gyro_bias;
    nav.orientation *= UnitQuaternion::from_scaled_axis(un_gyr * dt);
    let un_acc_1 = nav.orientation * (acc_1 - nav.accel_bias) - gravity;
    let un_acc = 0.5 * (un_acc_0 + un_acc_1);

    nav.position += dt * nav.velocity + 0.5 * dt * dt * un_acc;
    nav.velocity += dt * un_acc;
}

#[derive(Debug, Clone)]
pub struct ImuPredictor {
    gravity: Vector3<f64>,
    state: PredictorState,
}

impl ImuPredictor {
    pub fn new(gravity: Vector3<f64>) -> Self {
        Self {
            gravity,
            state: PredictorState::default(),
        }
    }

    /// Integrate one sample. Returns the predicted state, or `None` when the
    /// sample only initialized the reference time.
    pub fn on_sample(&mut self, sample: &ImuSample) -> Option<NavState> {
        let Some(latest_time) = self.state.latest_time else {
            self.state.latest_time = Some(sample.timestamp);
            self.state.last_accel = sample.accel;
            self.state.last_gyro = sample.gyro;
            return None;
        };

        let dt = sample.timestamp - latest_time;
        midpoint_step(
            &mut self.state.nav,
            &self.gravity,
            &self.state.last_accel,
            &self.state.last_gyro,
            &sample.accel,
            &sample.gyro,
            dt,
        );
        self.state.latest_time = Some(sample.timestamp);
        self.state.last_accel = sample.accel;
        self.state.last_gyro = sample.gyro;
        Some(self.state.nav)
    }

    /// Replace the state with the backend's confirmed state at `reference_time`
    /// and replay the samples still buffered after it.
    pub fn rebase<'a, I>(&mut self, confirmed: &ConfirmedState, reference_time: f64, pending: I)
    where
        I: IntoIterator<Item = &'a ImuSample>,
    {
        self.state = PredictorState {
            nav: confirmed.nav,
            latest_time: Some(reference_time),
            last_accel: confirmed.last_accel,
            last_gyro: confirmed.last_gyro,
        };
        for sample in pending {
            self.on_sample(sample);
        }
    }

    /// Forget everything; the next sample re-initializes the reference time.
    pub fn reset(&mut self) {
        self.state = PredictorState::default();
    }

    #[inline]
    pub fn state(&self) -> &PredictorState {
        &self.state
    }

    pub fn set_gravity(&mut self, gravity: Vector3<f64>) {
        self.gravity = gravity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: f64 = 9.81;

    fn gravity() -> Vector3<f64> {
        Vector3::new(0.0, 0.0, G)
    }

    fn at_rest(t: f64) -> ImuSample {
        ImuSample::new(t, gravity(), Vector3::zeros())
    }

    #[test]
    fn test_first_sample_initializes_only() {
        let mut predictor = ImuPredictor::new(gravity());
        assert!(predictor.on_sample(&at_rest(1.0)).is_none());
        assert_eq!(predictor.state().latest_time, Some(1.0));
        assert!(predictor.on_sample(&at_rest(1.01)).is_some());
    }

    #[test]
    fn test_gravity_only_stays_put() {
        let mut predictor = ImuPredictor::new(gravity());
        for i in 0..=10 {
            predictor.on_sample(&at_rest(i as f64 * 0.01));
        }
        let nav = predictor.state().nav;
        assert!(nav.position.norm() < 1e-12);
        assert!(nav.velocity.norm() < 1e-12);
        assert!(nav.orientation.angle() < 1e-12);
    }

    #[test]
    fn test_constant_acceleration() {
        let mut predictor = ImuPredictor::new(gravity());
        let accel = Vector3::new(1.0, 0.0, G);
        for i in 0..=100 {
            predictor.on_sample(&ImuSample::new(i as f64 * 0.01, accel, Vector3::zeros()));
        }
        let nav = predictor.state().nav;
        // x = a t^2 / 2 over 1 s
        assert!((nav.position.x - 0.5).abs() < 1e-9);
        assert!((nav.velocity.x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_rotation_rate() {
        let mut predictor = ImuPredictor::new(gravity());
        let rate = 0.5;
        for i in 0..=100 {
            let t = i as f64 * 0.01;
            // keep the specific force aligned with gravity in the world frame
            let nav = predictor.state().nav;
            let accel = nav.orientation.inverse() * gravity();
            predictor.on_sample(&ImuSample::new(t, accel, Vector3::new(0.0, 0.0, rate)));
        }
        let yaw = predictor.state().nav.orientation.euler_angles().2;
        assert!((yaw - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_rebase_is_state_substitution() {
        let samples: Vec<ImuSample> = (1..=5)
            .map(|i| {
                ImuSample::new(
                    2.0 + i as f64 * 0.01,
                    Vector3::new(0.3, -0.1, G + 0.2),
                    Vector3::new(0.01, 0.02, 0.03),
                )
            })
            .collect();
        let confirmed = ConfirmedState {
            timestamp: 2.0,
            nav: NavState {
                position: Vector3::new(1.0, 2.0, 3.0),
                velocity: Vector3::new(0.5, 0.0, 0.0),
                orientation: UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3),
                accel_bias: Vector3::new(0.01, 0.0, 0.0),
                gyro_bias: Vector3::zeros(),
            },
            last_accel: Vector3::new(0.2, 0.0, G),
            last_gyro: Vector3::zeros(),
            solver_ready: true,
        };

        let mut rebased = ImuPredictor::new(gravity());
        for i in 0..20 {
            rebased.on_sample(&at_rest(i as f64 * 0.01));
        }
        rebased.rebase(&confirmed, 2.0, samples.iter());

        let mut fresh = ImuPredictor::new(gravity());
        fresh.state = PredictorState {
            nav: confirmed.nav,
            latest_time: Some(2.0),
            last_accel: confirmed.last_accel,
            last_gyro: confirmed.last_gyro,
        };
        for sample in &samples {
            fresh.on_sample(sample);
        }

        assert_eq!(rebased.state(), fresh.state());
    }

    #[test]
    fn test_reset_reinitializes() {
        let mut predictor = ImuPredictor::new(gravity());
        predictor.on_sample(&at_rest(0.0));
        predictor.reset();
        assert!(predictor.on_sample(&at_rest(5.0)).is_none());
    }
}
