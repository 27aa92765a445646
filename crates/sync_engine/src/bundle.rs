//! Aligned measurement bundle and exact-timestamp inertial interpolation.

use contracts::{FeatureFrame, ImuSample, SatelliteBatch};
use nalgebra::Vector3;

/// One image with its inertial window and optional satellite batch
#[derive(Debug, Clone)]
pub struct MeasurementBundle {
    /// Restart generation the bundle was extracted in
    pub generation: u64,
    pub image: FeatureFrame,
    /// Image time on the inertial clock (`image.timestamp + td`)
    pub image_time: f64,
    /// Samples up to `image_time`, then the first one after it (peeked)
    pub inertial: Vec<ImuSample>,
    pub satellites: Option<SatelliteBatch>,
}

/// One backend inertial step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InertialStep {
    pub dt: f64,
    pub accel: Vector3<f64>,
    pub gyro: Vector3<f64>,
    /// Synthesized at the image time from the bracketing pair
    pub interpolated: bool,
}

/// Running inertial time and last raw sample across bundles
///
/// Owned by the orchestrator; reset on restart.
#[derive(Debug, Clone, Default)]
pub struct InertialCursor {
    running_time: Option<f64>,
    last: Option<(Vector3<f64>, Vector3<f64>)>,
}

impl InertialCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time of the last step fed to the backend
    #[inline]
    pub fn running_time(&self) -> Option<f64> {
        self.running_time
    }

    pub fn reset(&mut self) {
        self.running_time = None;
        self.last = None;
    }

    /// Turn a bundle's window into backend steps ending exactly at the image time.
    pub fn steps(&mut self, bundle: &MeasurementBundle) -> Vec<InertialStep> {
        let image_time = bundle.image_time;
        let mut steps = Vec::with_capacity(bundle.inertial.len());

        for sample in &bundle.inertial {
            let t = sample.timestamp;
            if t <= image_time {
                let current = *self.running_time.get_or_insert(t);
                let dt = t - current;
                debug_assert!(dt >= 0.0);
                self.running_time = Some(t);
                self.last = Some((sample.accel, sample.gyro));
                steps.push(InertialStep {
                    dt,
                    accel: sample.accel,
                    gyro: sample.gyro,
                    interpolated: false,
                });
            } else {
                let current = self.running_time.unwrap_or(image_time);
                let dt_1 = image_time - current;
                let dt_2 = t - image_time;
                let (accel, gyro) = match self.last {
                    Some((last_accel, last_gyro)) if dt_1 + dt_2 > 0.0 => {
                        let w1 = dt_2 / (dt_1 + dt_2);
                        let w2 = dt_1 / (dt_1 + dt_2);
                        (
                            last_accel * w1 + sample.accel * w2,
                            last_gyro * w1 + sample.gyro * w2,
                        )
                    }
                    // nothing to interpolate from: hold the bracketing sample
                    _ => (sample.accel, sample.gyro),
                };
                self.running_time = Some(image_time);
                self.last = Some((accel, gyro));
                steps.push(InertialStep {
                    dt: dt_1,
                    accel,
                    gyro,
                    interpolated: true,
                });
            }
        }
        steps
    }
}
