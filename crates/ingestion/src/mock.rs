//! Mock 传感器源
//!
//! 在没有真实驱动的环境下生成 IMU、特征帧、卫星观测与 PPS 数据。
//! 所有源共享一个 [`SimClock`]，时间戳按固定频率递增，发送节奏跟随墙钟。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{
    Constellation, Ephemeris, FeatureFrame, FeatureObservation, ImuSample, SatelliteBatch,
    SatelliteObservation, SensorChannel, SensorDataCallback, SensorMessage, SensorSource,
    TimePulse, IONO_PARAM_COUNT,
};
use nalgebra::{Vector2, Vector3};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace, warn};

/// 仿真时钟
///
/// 本地时间 = `local_start` + 墙钟流逝 × `time_scale`；GNSS 时间 = 本地时间 + `gnss_offset`。
#[derive(Debug, Clone, Copy)]
pub struct SimClock {
    origin: Instant,
    local_start: f64,
    gnss_offset: f64,
    time_scale: f64,
}

impl SimClock {
    pub fn new(local_start: f64, gnss_offset: f64) -> Self {
        Self {
            origin: Instant::now(),
            local_start,
            gnss_offset,
            time_scale: 1.0,
        }
    }

    /// 加速（>1）或减速（<1）仿真
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale.max(f64::EPSILON);
        self
    }

    #[inline]
    pub fn local_start(&self) -> f64 {
        self.local_start
    }

    #[inline]
    pub fn gnss_offset(&self) -> f64 {
        self.gnss_offset
    }

    pub fn local_now(&self) -> f64 {
        self.local_start + self.origin.elapsed().as_secs_f64() * self.time_scale
    }

    pub fn to_gnss(&self, local_time: f64) -> f64 {
        local_time + self.gnss_offset
    }

    /// 阻塞直到本地时间到达 `local_time`
    pub fn sleep_until(&self, local_time: f64) {
        let wall = (local_time - self.local_start) / self.time_scale;
        let target = self.origin + Duration::from_secs_f64(wall.max(0.0));
        let now = Instant::now();
        if target > now {
            thread::sleep(target - now);
        }
    }
}

/// Mock 源类型
#[derive(Debug, Clone, PartialEq)]
pub enum MockKind {
    /// 静止 IMU：比力 = 重力 + 均匀噪声
    Imu { gravity: f64, noise: f64 },
    /// 固定特征点网格
    Features { count: usize },
    /// 卫星观测批次（首个历元附带星历与电离层参数）
    Gnss { satellites: usize },
    /// PPS：时间脉冲紧跟本地触发
    Pps,
}

impl MockKind {
    pub fn channel(&self) -> SensorChannel {
        match self {
            Self::Imu { .. } => SensorChannel::Imu,
            Self::Features { .. } => SensorChannel::Features,
            Self::Gnss { .. } => SensorChannel::Satellites,
            Self::Pps => SensorChannel::TimePulse,
        }
    }
}

/// Mock 传感器源配置
#[derive(Debug, Clone)]
pub struct MockSensorConfig {
    /// 源 ID
    pub source_id: String,

    /// 源类型
    pub kind: MockKind,

    /// 发送频率 (Hz)
    pub frequency_hz: f64,

    /// 随机种子
    pub seed: u64,
}

impl Default for MockSensorConfig {
    fn default() -> Self {
        Self {
            source_id: "mock_imu".to_string(),
            kind: MockKind::Imu {
                gravity: 9.81,
                noise: 0.0,
            },
            frequency_hz: 200.0,
            seed: 0,
        }
    }
}

/// Mock 传感器源
///
/// 每个源在独立线程上按频率生成数据，通过回调送出。
pub struct MockSensorSource {
    config: MockSensorConfig,
    clock: SimClock,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MockSensorSource {
    /// 创建新的 Mock 传感器源
    pub fn new(config: MockSensorConfig, clock: SimClock) -> Self {
        Self {
            config,
            clock,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// 创建 Mock IMU 源
    pub fn imu(
        source_id: &str,
        clock: SimClock,
        frequency_hz: f64,
        gravity: f64,
        noise: f64,
    ) -> Self {
        Self::new(
            MockSensorConfig {
                source_id: source_id.to_string(),
                kind: MockKind::Imu { gravity, noise },
                frequency_hz,
                seed: 1,
            },
            clock,
        )
    }

    /// 创建 Mock 特征帧源
    pub fn features(source_id: &str, clock: SimClock, frequency_hz: f64, count: usize) -> Self {
        Self::new(
            MockSensorConfig {
                source_id: source_id.to_string(),
                kind: MockKind::Features { count },
                frequency_hz,
                seed: 2,
            },
            clock,
        )
    }

    /// 创建 Mock GNSS 源
    pub fn gnss(source_id: &str, clock: SimClock, frequency_hz: f64, satellites: usize) -> Self {
        Self::new(
            MockSensorConfig {
                source_id: source_id.to_string(),
                kind: MockKind::Gnss { satellites },
                frequency_hz,
                seed: 3,
            },
            clock,
        )
    }

    /// 创建 Mock PPS 源
    pub fn pps(source_id: &str, clock: SimClock, frequency_hz: f64) -> Self {
        Self::new(
            MockSensorConfig {
                source_id: source_id.to_string(),
                kind: MockKind::Pps,
                frequency_hz,
                seed: 4,
            },
            clock,
        )
    }

    pub fn config(&self) -> &MockSensorConfig {
        &self.config
    }
}

impl SensorSource for MockSensorSource {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    fn channel(&self) -> SensorChannel {
        self.config.kind.channel()
    }

    fn listen(&self, callback: SensorDataCallback) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let config = self.config.clone();
        let clock = self.clock;
        let running = Arc::clone(&self.running);

        let spawned = thread::Builder::new()
            .name(format!("mock-{}", config.source_id))
            .spawn(move || run_source(config, clock, running, callback));

        match spawned {
            Ok(handle) => *self.worker.lock() = Some(handle),
            Err(e) => {
                warn!(
                    source_id = %self.config.source_id,
                    error = %e,
                    "failed to spawn mock source thread"
                );
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                warn!(source_id = %self.config.source_id, "mock source thread panicked");
            }
        }
    }

    fn is_listening(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl Drop for MockSensorSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_source(
    config: MockSensorConfig,
    clock: SimClock,
    running: Arc<AtomicBool>,
    callback: SensorDataCallback,
) {
    let period = 1.0 / config.frequency_hz;
    let mut rng = StdRng::seed_from_u64(config.seed);
    // late starters join the shared timeline instead of replaying the past
    let mut tick = ((clock.local_now() - clock.local_start()) / period).ceil().max(0.0) as u64;
    let first_tick = tick;

    debug!(
        source_id = %config.source_id,
        kind = ?config.kind,
        frequency_hz = config.frequency_hz,
        "mock sensor source started"
    );

    while running.load(Ordering::Relaxed) {
        let local_time = clock.local_start() + tick as f64 * period;
        clock.sleep_until(local_time);
        if !running.load(Ordering::Relaxed) {
            break;
        }

        for message in generate(&config.kind, tick == first_tick, local_time, &clock, &mut rng) {
            callback(message);
        }
        trace!(source_id = %config.source_id, tick, local_time, "mock message sent");
        tick += 1;
    }

    debug!(source_id = %config.source_id, ticks = tick - first_tick, "mock sensor source stopped");
}

fn generate(
    kind: &MockKind,
    first: bool,
    local_time: f64,
    clock: &SimClock,
    rng: &mut StdRng,
) -> Vec<SensorMessage> {
    match kind {
        MockKind::Imu { gravity, noise } => {
            let mut jitter = || {
                if *noise > 0.0 {
                    rng.random_range(-noise..=*noise)
                } else {
                    0.0
                }
            };
            let accel = Vector3::new(jitter(), jitter(), gravity + jitter());
            let gyro = Vector3::new(jitter(), jitter(), jitter()) * 0.1;
            vec![SensorMessage::Imu(ImuSample::new(local_time, accel, gyro))]
        }
        MockKind::Features { count } => {
            vec![SensorMessage::Features(feature_grid(local_time, *count))]
        }
        MockKind::Gnss { satellites } => {
            let gnss_time = clock.to_gnss(local_time);
            let mut messages = Vec::with_capacity(satellites + 2);
            if first {
                for prn in 1..=*satellites as u16 {
                    messages.push(SensorMessage::Ephemeris(Ephemeris {
                        constellation: Constellation::Gps,
                        prn,
                        toe: gnss_time,
                        params: vec![0.0; 16],
                    }));
                }
                messages.push(SensorMessage::IonoParams {
                    timestamp: gnss_time,
                    values: vec![1.0e-8; IONO_PARAM_COUNT],
                });
            }
            let observations = (1..=*satellites as u16)
                .map(|prn| SatelliteObservation {
                    constellation: Constellation::Gps,
                    prn,
                    pseudorange: 2.0e7 + prn as f64 * 1.0e5 + rng.random_range(-1.0..=1.0),
                    carrier_phase: 1.0e8 + prn as f64 * 1.0e3,
                    doppler: rng.random_range(-500.0..=500.0),
                    cn0: 45.0,
                })
                .collect();
            messages.push(SensorMessage::Satellites(SatelliteBatch::new(
                gnss_time,
                observations,
            )));
            messages
        }
        MockKind::Pps => vec![
            SensorMessage::TimePulse(TimePulse::from_gps_seconds(clock.to_gnss(local_time))),
            SensorMessage::LocalTrigger {
                timestamp: local_time,
            },
        ],
    }
}

/// Features on a fixed grid of normalized rays, ids stable across frames.
fn feature_grid(timestamp: f64, count: usize) -> FeatureFrame {
    const FOCAL: f64 = 460.0;
    const CX: f64 = 320.0;
    const CY: f64 = 240.0;

    let side = (count as f64).sqrt().ceil().max(1.0) as usize;
    let observations = (0..count)
        .map(|i| {
            let x = ((i % side) as f64 / side as f64 - 0.5) * 0.8;
            let y = ((i / side) as f64 / side as f64 - 0.5) * 0.6;
            FeatureObservation {
                feature_id: i as u32,
                camera_id: 0,
                point: Vector3::new(x, y, 1.0),
                pixel: Vector2::new(FOCAL * x + CX, FOCAL * y + CY),
                velocity: Vector2::zeros(),
            }
        })
        .collect();
    FeatureFrame::new(timestamp, observations)
}
