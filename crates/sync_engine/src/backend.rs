//! Dead-reckoning reference backend.
//!
//! Integrates inertial steps with the same midpoint scheme as the predictor
//! and keeps a sliding window of image poses. It stands in for the nonlinear
//! estimator so the pipeline can run end to end.

use std::collections::VecDeque;

use contracts::{
    ConfirmedState, Ephemeris, EstimatorBackend, EstimatorConfig, EstimatorSnapshot, FeatureMap,
    IonoParameters, KeyframeRecord, NavState, SatelliteBatch,
};
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use tracing::{debug, info};

use crate::predictor::midpoint_step;

#[derive(Debug, Clone, Copy)]
struct WindowFrame {
    timestamp: f64,
    nav: NavState,
    feature_count: usize,
}

#[derive(Debug)]
pub struct DeadReckoningBackend {
    params: EstimatorConfig,
    gravity: Vector3<f64>,
    td: f64,
    nav: NavState,
    last_raw: Option<(Vector3<f64>, Vector3<f64>)>,
    timestamp: f64,
    frames_seen: usize,
    window: VecDeque<WindowFrame>,
    marginalized: Option<WindowFrame>,
    clock_offset: Option<f64>,
    satellite_batches: u64,
    ephemerides: u64,
    iono: Option<IonoParameters>,
}

impl DeadReckoningBackend {
    pub fn new(params: EstimatorConfig) -> Self {
        let mut backend = Self {
            gravity: Vector3::new(0.0, 0.0, params.gravity),
            td: params.td,
            params,
            nav: NavState::default(),
            last_raw: None,
            timestamp: 0.0,
            frames_seen: 0,
            window: VecDeque::new(),
            marginalized: None,
            clock_offset: None,
            satellite_batches: 0,
            ephemerides: 0,
            iono: None,
        };
        backend.set_parameter();
        backend
    }

    #[inline]
    pub fn solver_ready(&self) -> bool {
        self.frames_seen > self.params.warmup_frames
    }

    #[inline]
    pub fn satellite_batches(&self) -> u64 {
        self.satellite_batches
    }

    #[inline]
    pub fn clock_offset(&self) -> Option<f64> {
        self.clock_offset
    }

    #[inline]
    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }

    #[inline]
    pub fn ephemerides(&self) -> u64 {
        self.ephemerides
    }

    #[inline]
    pub fn iono_params(&self) -> Option<&IonoParameters> {
        self.iono.as_ref()
    }

    fn body_to_camera(&self) -> Isometry3<f64> {
        let [x, y, z] = self.params.camera_translation;
        Isometry3::from_parts(Translation3::new(x, y, z), UnitQuaternion::identity())
    }
}

impl EstimatorBackend for DeadReckoningBackend {
    fn process_inertial(&mut self, dt: f64, accel: &Vector3<f64>, gyro: &Vector3<f64>) {
        if let Some((acc_0, gyr_0)) = self.last_raw {
            midpoint_step(&mut self.nav, &self.gravity, &acc_0, &gyr_0, accel, gyro, dt);
        }
        self.last_raw = Some((*accel, *gyro));
    }

    fn process_satellites(&mut self, batch: &SatelliteBatch) {
        self.satellite_batches += 1;
        debug!(
            time = batch.time,
            satellites = batch.observations.len(),
            "satellite batch added"
        );
    }

    fn process_image(&mut self, features: &FeatureMap, timestamp: f64) -> ConfirmedState {
        self.frames_seen += 1;
        self.timestamp = timestamp;

        self.window.push_back(WindowFrame {
            timestamp,
            nav: self.nav,
            feature_count: features.len(),
        });
        self.marginalized = None;
        while self.window.len() > self.params.window_size + 1 {
            self.marginalized = self.window.pop_front();
        }

        if self.frames_seen == self.params.warmup_frames + 1 {
            info!(frames = self.frames_seen, "backend initialized");
        }
        self.confirmed_state()
    }

    fn clear_state(&mut self) {
        self.nav = NavState::default();
        self.last_raw = None;
        self.timestamp = 0.0;
        self.frames_seen = 0;
        self.window.clear();
        self.marginalized = None;
        self.satellite_batches = 0;
    }

    fn set_parameter(&mut self) {
        self.gravity = Vector3::new(0.0, 0.0, self.params.gravity);
        self.td = self.params.td;
    }

    fn confirmed_state(&self) -> ConfirmedState {
        let (last_accel, last_gyro) = self
            .last_raw
            .unwrap_or((Vector3::zeros(), Vector3::zeros()));
        ConfirmedState {
            timestamp: self.timestamp,
            nav: self.nav,
            last_accel,
            last_gyro,
            solver_ready: self.solver_ready(),
        }
    }

    fn camera_imu_time_offset(&self) -> f64 {
        self.td
    }

    fn gravity(&self) -> Vector3<f64> {
        self.gravity
    }

    fn snapshot(&self) -> EstimatorSnapshot {
        let body_to_camera = self.body_to_camera();
        // landmarks one meter ahead of each window camera
        let map_points = self
            .window
            .iter()
            .map(|frame| (frame.nav.pose() * body_to_camera) * nalgebra::Point3::new(0.0, 0.0, 1.0))
            .map(|p| p.coords)
            .collect();

        EstimatorSnapshot {
            state: self.confirmed_state(),
            key_positions: self.window.iter().map(|f| f.nav.position).collect(),
            body_to_camera,
            map_points,
            keyframe: self.marginalized.map(|frame| KeyframeRecord {
                timestamp: frame.timestamp,
                pose: frame.nav.pose(),
                feature_count: frame.feature_count,
            }),
        }
    }

    fn input_clock_offset(&mut self, offset: f64) {
        self.clock_offset = Some(offset);
    }

    fn input_ephemeris(&mut self, _ephemeris: &Ephemeris) {
        self.ephemerides += 1;
    }

    fn input_iono_params(&mut self, params: &IonoParameters) {
        self.iono = Some(*params);
    }
}
