//! Fusion node: producer entry points and the single consumer loop.
//!
//! Lock order wherever locks nest: estimator -> buffers -> predictor.
//! The clock and decimator locks are only ever held briefly on their own or
//! inside the buffer lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use contracts::{
    BundleStatistics, ConfirmedState, Ephemeris, EstimatorBackend, FeatureFrame, ImuSample,
    IonoParameters, MeasurementHandler, OutputEvent, OutputSink, PoseStamped, SatelliteBatch,
    SensorChannel, SensorMessage, SyncEngineConfig, TimePulse,
};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::buffer::PushOutcome;
use crate::buffers::IngestBuffers;
use crate::bundle::{InertialCursor, MeasurementBundle};
use crate::clock::ClockSynchronizer;
use crate::decimator::{Admission, RateDecimator};
use crate::predictor::{ImuPredictor, PredictorState};
use crate::synchronizer::{BundleStatus, MeasurementSynchronizer, SyncStats, WaitReason};

/// State behind the buffer lock
#[derive(Debug)]
struct SyncCore {
    buffers: IngestBuffers,
    synchronizer: MeasurementSynchronizer,
    generation: u64,
    last_wait: Option<WaitReason>,
}

impl SyncCore {
    fn poll(&mut self, clock_offset: Option<f64>, td: f64) -> BundleStatus {
        self.synchronizer
            .try_bundle(&mut self.buffers, clock_offset, td, self.generation)
    }

    fn note_wait(&mut self, reason: WaitReason) {
        if self.last_wait != Some(reason) {
            debug!(%reason, "waiting for measurements");
            self.last_wait = Some(reason);
        }
    }
}

/// State behind the backend-busy lock
struct EstimatorSlot<B> {
    backend: B,
    cursor: InertialCursor,
    bundles: u64,
}

struct Shared<B, O> {
    config: SyncEngineConfig,
    core: Mutex<SyncCore>,
    data_ready: Condvar,
    predictor: Mutex<ImuPredictor>,
    estimator: Mutex<EstimatorSlot<B>>,
    clock: ClockSynchronizer,
    decimator: Mutex<RateDecimator>,
    output: O,
    /// Mirrors `SyncCore::generation` for checks outside the buffer lock
    generation: AtomicU64,
    solver_ready: AtomicBool,
    /// Backend `td` as f64 bits, cached for use under the buffer lock
    td_bits: AtomicU64,
    running: AtomicBool,
}

/// Measurement synchronization and prediction pipeline
///
/// Cheap to clone; every clone drives the same pipeline. Producer methods may
/// be called concurrently from one thread per channel, the consumer runs on
/// its own thread (see [`FusionNode::spawn_consumer`]).
pub struct FusionNode<B, O> {
    shared: Arc<Shared<B, O>>,
}

impl<B, O> Clone for FusionNode<B, O> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B, O> FusionNode<B, O>
where
    B: EstimatorBackend,
    O: OutputSink,
{
    pub fn new(config: SyncEngineConfig, mut backend: B, output: O) -> Self {
        let clock = ClockSynchronizer::new(config.clock, config.gnss_enabled);
        if let Some(offset) = clock.static_offset() {
            backend.input_clock_offset(offset);
        }
        let predictor = ImuPredictor::new(backend.gravity());
        let td = backend.camera_imu_time_offset();
        let core = SyncCore {
            buffers: IngestBuffers::new(&config.buffer),
            synchronizer: MeasurementSynchronizer::new(&config),
            generation: 0,
            last_wait: None,
        };

        info!(
            gnss_enabled = config.gnss_enabled,
            clock = ?config.clock,
            tolerance = config.max_gnss_camera_delay,
            satellite_wait = ?config.satellite_wait,
            "fusion node created"
        );

        Self {
            shared: Arc::new(Shared {
                clock,
                decimator: Mutex::new(RateDecimator::new(config.gnss_enabled)),
                config,
                core: Mutex::new(core),
                data_ready: Condvar::new(),
                predictor: Mutex::new(predictor),
                estimator: Mutex::new(EstimatorSlot {
                    backend,
                    cursor: InertialCursor::new(),
                    bundles: 0,
                }),
                output,
                generation: AtomicU64::new(0),
                solver_ready: AtomicBool::new(false),
                td_bits: AtomicU64::new(td.to_bits()),
                running: AtomicBool::new(true),
            }),
        }
    }

    // ===== Producers =====

    /// Inertial sample: buffer it, wake the consumer, then advance the predictor.
    pub fn on_imu(&self, sample: ImuSample) {
        let outcome = {
            let mut core = self.shared.core.lock();
            let outcome = core.buffers.imu.push(sample);
            if outcome.is_accepted() {
                self.shared.data_ready.notify_one();
            }
            outcome
        };
        if !self.note_push(SensorChannel::Imu, sample.timestamp, outcome) {
            return;
        }

        let predicted = self.shared.predictor.lock().on_sample(&sample);
        if let Some(nav) = predicted {
            if self.shared.solver_ready.load(Ordering::Acquire) {
                self.shared
                    .output
                    .publish(OutputEvent::LatestPose(PoseStamped::from_nav(
                        sample.timestamp,
                        &nav,
                    )));
            }
        }
    }

    /// Feature frame: decimate, then buffer.
    pub fn on_features(&self, frame: FeatureFrame) {
        if let Err(e) = frame.validate() {
            fatal_input(e);
        }

        let offset = self.shared.clock.offset();
        let admission = self.shared.decimator.lock().admit(frame.timestamp, offset);
        if admission == Admission::Drop {
            trace!(timestamp = frame.timestamp, "image decimated");
            observability::record_decimated_image();
            return;
        }

        let timestamp = frame.timestamp;
        let outcome = {
            let mut core = self.shared.core.lock();
            let outcome = core.buffers.features.push(frame);
            if outcome.is_accepted() {
                self.shared.data_ready.notify_one();
            }
            outcome
        };
        self.note_push(SensorChannel::Features, timestamp, outcome);
    }

    /// Satellite batch: feeds the decimator, buffered once the clock is calibrated.
    pub fn on_satellites(&self, batch: SatelliteBatch) {
        self.shared
            .decimator
            .lock()
            .observe_satellite_time(batch.time);

        if !self.shared.config.gnss_enabled {
            trace!(time = batch.time, "GNSS fusion disabled, ignoring satellite batch");
            return;
        }
        if !self.shared.clock.is_valid() {
            debug!(time = batch.time, "clock offset not calibrated, ignoring satellite batch");
            return;
        }

        let time = batch.time;
        let outcome = {
            let mut core = self.shared.core.lock();
            let outcome = core.buffers.satellites.push(batch);
            if outcome.is_accepted() {
                self.shared.data_ready.notify_one();
            }
            outcome
        };
        self.note_push(SensorChannel::Satellites, time, outcome);
    }

    pub fn on_time_pulse(&self, pulse: TimePulse) {
        match pulse.to_gps_seconds() {
            Ok(gnss_time) => self.shared.clock.on_pulse(gnss_time),
            Err(e) => error!(error = %e, "cannot normalize time pulse, ignored"),
        }
    }

    pub fn on_local_trigger(&self, local_time: f64) {
        let Some(offset) = self.shared.clock.on_local_trigger(local_time) else {
            return;
        };
        self.shared
            .estimator
            .lock()
            .backend
            .input_clock_offset(offset);

        // a consumer may be parked on calibration
        let _core = self.shared.core.lock();
        self.shared.data_ready.notify_all();
    }

    pub fn on_ephemeris(&self, ephemeris: Ephemeris) {
        self.shared
            .estimator
            .lock()
            .backend
            .input_ephemeris(&ephemeris);
    }

    /// Broadcast ionosphere coefficients.
    ///
    /// # Panics
    /// A vector that does not hold exactly eight coefficients is a producer
    /// contract violation and aborts the pipeline.
    pub fn on_iono_params(&self, timestamp: f64, values: &[f64]) {
        match IonoParameters::from_values(timestamp, values) {
            Ok(params) => self
                .shared
                .estimator
                .lock()
                .backend
                .input_iono_params(&params),
            Err(e) => fatal_input(e),
        }
    }

    /// Reset buffers, backend and predictor. Only `true` triggers a reset.
    pub fn on_restart(&self, restart: bool) {
        if !restart {
            return;
        }
        warn!("restart requested, resetting estimator");

        let mut slot = self.shared.estimator.lock();
        {
            let mut core = self.shared.core.lock();
            let cleared = core.buffers.clear();
            core.generation += 1;
            core.last_wait = None;
            self.shared
                .generation
                .store(core.generation, Ordering::Release);
            info!(
                imu = cleared.imu,
                features = cleared.features,
                satellites = cleared.satellites,
                generation = core.generation,
                "buffers cleared"
            );
        }

        slot.backend.clear_state();
        slot.backend.set_parameter();
        slot.cursor.reset();
        self.shared.solver_ready.store(false, Ordering::Release);
        self.shared.td_bits.store(
            slot.backend.camera_imu_time_offset().to_bits(),
            Ordering::Release,
        );

        let mut predictor = self.shared.predictor.lock();
        predictor.reset();
        predictor.set_gravity(slot.backend.gravity());
        observability::record_restart();
    }

    /// Returns whether the item was accepted.
    fn note_push(&self, channel: SensorChannel, timestamp: f64, outcome: PushOutcome) -> bool {
        match outcome {
            PushOutcome::Accepted => true,
            PushOutcome::AcceptedWithEviction { evicted } => {
                debug!(%channel, evicted, "buffer full, evicted oldest item");
                observability::record_eviction(channel.as_str());
                true
            }
            PushOutcome::Disorder { last } => {
                warn!(%channel, timestamp, last, "measurement out of order, dropped");
                observability::record_disorder(channel.as_str());
                false
            }
        }
    }

    // ===== Consumer =====

    fn td(&self) -> f64 {
        f64::from_bits(self.shared.td_bits.load(Ordering::Acquire))
    }

    /// Block until a bundle is ready. Returns `None` after [`shutdown`](Self::shutdown).
    pub fn next_bundle(&self) -> Option<MeasurementBundle> {
        let mut core = self.shared.core.lock();
        loop {
            if !self.shared.running.load(Ordering::Acquire) {
                return None;
            }
            let offset = self.shared.clock.offset();
            match core.poll(offset, self.td()) {
                BundleStatus::Ready(bundle) => {
                    core.last_wait = None;
                    let (imu, features, satellites) = core.buffers.depths();
                    observability::record_buffer_depths(imu, features, satellites);
                    return Some(*bundle);
                }
                BundleStatus::NotReady(reason) => {
                    core.note_wait(reason);
                    self.shared.data_ready.wait(&mut core);
                }
            }
        }
    }

    /// Non-blocking variant of [`next_bundle`](Self::next_bundle).
    pub fn try_next_bundle(&self) -> Result<MeasurementBundle, WaitReason> {
        let mut core = self.shared.core.lock();
        let offset = self.shared.clock.offset();
        match core.poll(offset, self.td()) {
            BundleStatus::Ready(bundle) => Ok(*bundle),
            BundleStatus::NotReady(reason) => {
                core.note_wait(reason);
                Err(reason)
            }
        }
    }

    /// Feed one bundle through the backend, publish, and rebase the predictor.
    ///
    /// Returns `None` when the bundle predates a restart and was discarded.
    #[instrument(
        name = "fusion_process_bundle",
        skip(self, bundle),
        fields(image_time = bundle.image_time, imu = bundle.inertial.len())
    )]
    pub fn process_bundle(&self, bundle: MeasurementBundle) -> Option<BundleStatistics> {
        let mut guard = self.shared.estimator.lock();
        if bundle.generation != self.shared.generation.load(Ordering::Acquire) {
            warn!(
                generation = bundle.generation,
                "discarding bundle extracted before restart"
            );
            return None;
        }
        let slot = &mut *guard;
        let started = Instant::now();

        for step in slot.cursor.steps(&bundle) {
            slot.backend.process_inertial(step.dt, &step.accel, &step.gyro);
        }

        let mut satellite_count = 0;
        if self.shared.config.gnss_enabled {
            if let Some(batch) = &bundle.satellites {
                slot.backend.process_satellites(batch);
                satellite_count = batch.observations.len();
            }
        }

        let features = bundle.image.feature_map();
        let confirmed = slot.backend.process_image(&features, bundle.image.timestamp);
        let backend_ms = started.elapsed().as_secs_f64() * 1000.0;
        slot.bundles += 1;

        let stats = BundleStatistics {
            bundle_id: slot.bundles,
            timestamp: bundle.image.timestamp,
            backend_ms,
            imu_count: bundle.inertial.len(),
            feature_count: features.len(),
            satellite_count,
            solver_ready: confirmed.solver_ready,
            accel_bias: confirmed.nav.accel_bias,
            gyro_bias: confirmed.nav.gyro_bias,
        };
        debug!(
            bundle_id = stats.bundle_id,
            backend_ms,
            satellites = satellite_count,
            solver_ready = confirmed.solver_ready,
            "bundle processed"
        );

        self.publish_bundle(&slot.backend, &confirmed, &stats);
        self.shared.td_bits.store(
            slot.backend.camera_imu_time_offset().to_bits(),
            Ordering::Release,
        );

        if confirmed.solver_ready {
            let reference_time = slot.cursor.running_time().unwrap_or(bundle.image_time);
            let core = self.shared.core.lock();
            self.shared
                .predictor
                .lock()
                .rebase(&confirmed, reference_time, core.buffers.imu.iter());
        }
        // producers publish latest poses only from a rebased predictor
        self.shared
            .solver_ready
            .store(confirmed.solver_ready, Ordering::Release);

        observability::record_bundle(&stats);
        Some(stats)
    }

    fn publish_bundle(&self, backend: &B, confirmed: &ConfirmedState, stats: &BundleStatistics) {
        let output = &self.shared.output;
        let timestamp = confirmed.timestamp;

        if confirmed.solver_ready {
            let snapshot = backend.snapshot();
            let world_from_body = confirmed.nav.pose();

            output.publish(OutputEvent::Odometry(PoseStamped::from_nav(
                timestamp,
                &confirmed.nav,
            )));
            output.publish(OutputEvent::KeyPoses {
                timestamp,
                positions: snapshot.key_positions,
            });
            output.publish(OutputEvent::CameraPose {
                timestamp,
                pose: world_from_body * snapshot.body_to_camera,
            });
            output.publish(OutputEvent::PointCloud {
                timestamp,
                points: snapshot.map_points,
            });
            output.publish(OutputEvent::Transform {
                timestamp,
                world_from_body,
            });
            if let Some(keyframe) = snapshot.keyframe {
                output.publish(OutputEvent::Keyframe(keyframe));
            }
        }
        output.publish(OutputEvent::Statistics(stats.clone()));
    }

    /// Wait for and process one bundle. Returns `false` once shut down.
    pub fn process_next(&self) -> bool {
        match self.next_bundle() {
            Some(bundle) => {
                self.process_bundle(bundle);
                true
            }
            None => false,
        }
    }

    /// Stop the consumer loop. Producers keep working; nothing is consumed.
    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::Release);
        let _core = self.shared.core.lock();
        self.shared.data_ready.notify_all();
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    // ===== Inspection =====

    pub fn sync_stats(&self) -> SyncStats {
        self.shared.core.lock().synchronizer.stats()
    }

    /// (imu, features, satellites)
    pub fn buffer_depths(&self) -> (usize, usize, usize) {
        self.shared.core.lock().buffers.depths()
    }

    /// Timestamps of the buffered inertial samples, oldest first
    pub fn buffered_imu_timestamps(&self) -> Vec<f64> {
        self.shared
            .core
            .lock()
            .buffers
            .imu
            .iter()
            .map(|s| s.timestamp)
            .collect()
    }

    pub fn clock_offset(&self) -> Option<f64> {
        self.shared.clock.offset()
    }

    /// Image parity dropped by the decimator, once latched
    pub fn skip_parity(&self) -> Option<u64> {
        self.shared.decimator.lock().skip_parity()
    }

    pub fn predictor_state(&self) -> PredictorState {
        *self.shared.predictor.lock().state()
    }

    pub fn solver_ready(&self) -> bool {
        self.shared.solver_ready.load(Ordering::Acquire)
    }

    /// Run `f` against the backend under the backend-busy lock.
    pub fn with_backend<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        f(&self.shared.estimator.lock().backend)
    }
}

impl<B, O> FusionNode<B, O>
where
    B: EstimatorBackend + 'static,
    O: OutputSink + 'static,
{
    /// Run the consumer loop on a named thread until [`shutdown`](Self::shutdown).
    ///
    /// The handle yields the number of bundles processed.
    pub fn spawn_consumer(&self) -> std::io::Result<JoinHandle<u64>> {
        let node = self.clone();
        thread::Builder::new()
            .name("fusion-consumer".into())
            .spawn(move || {
                let mut processed = 0u64;
                while node.process_next() {
                    processed += 1;
                }
                info!(processed, "consumer loop stopped");
                processed
            })
    }
}

impl<B, O> MeasurementHandler for FusionNode<B, O>
where
    B: EstimatorBackend,
    O: OutputSink,
{
    fn handle(&self, message: SensorMessage) {
        match message {
            SensorMessage::Imu(sample) => self.on_imu(sample),
            SensorMessage::Features(frame) => self.on_features(frame),
            SensorMessage::Satellites(batch) => self.on_satellites(batch),
            SensorMessage::Ephemeris(ephemeris) => self.on_ephemeris(ephemeris),
            SensorMessage::IonoParams { timestamp, values } => {
                self.on_iono_params(timestamp, &values)
            }
            SensorMessage::TimePulse(pulse) => self.on_time_pulse(pulse),
            SensorMessage::LocalTrigger { timestamp } => self.on_local_trigger(timestamp),
            SensorMessage::Restart(restart) => self.on_restart(restart),
        }
    }
}

fn fatal_input(err: contracts::ContractError) -> ! {
    error!(error = %err, "malformed input");
    panic!("{err}");
}
