//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置到同步引擎配置的合约测试
//! - 测量同步场景测试（FusionNode 直接驱动）
//! - 模拟 e2e 测试（Mock 源 -> FusionNode -> Dispatcher）

#[cfg(test)]
mod contract_tests {
    use contracts::{ClockCalibration, FusionBlueprint, SatelliteWaitPolicy};

    #[test]
    fn test_default_blueprint_maps_to_engine_config() {
        let config = FusionBlueprint::default().to_sync_engine_config();
        assert!(!config.gnss_enabled);
        assert_eq!(config.clock, ClockCalibration::Online);
        assert!((config.max_gnss_camera_delay - 0.05).abs() < 1e-12);
        assert_eq!(config.satellite_wait, SatelliteWaitPolicy::Block);
    }

    #[test]
    fn test_toml_static_clock_round_trip() {
        let toml = r#"
            [gnss]
            enabled = true
            online_sync = false
            local_time_diff = 18.0
            satellite_wait = "proceed_without_satellites"
        "#;
        let blueprint =
            config_loader::ConfigLoader::load_from_str(toml, config_loader::ConfigFormat::Toml)
                .unwrap();
        let serialized = config_loader::ConfigLoader::to_toml(&blueprint).unwrap();
        let reloaded = config_loader::ConfigLoader::load_from_str(
            &serialized,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let config = reloaded.to_sync_engine_config();
        assert!(config.gnss_enabled);
        assert_eq!(config.clock, ClockCalibration::Static { offset: 18.0 });
        assert_eq!(
            config.satellite_wait,
            SatelliteWaitPolicy::ProceedWithoutSatellites
        );
    }
}

/// Shared fixtures for the synchronization scenarios
#[cfg(test)]
mod fixtures {
    use std::sync::Arc;

    use contracts::{
        EstimatorConfig, FeatureFrame, FeatureObservation, ImuSample, OutputEvent, OutputSink,
        SyncEngineConfig,
    };
    use nalgebra::{Vector2, Vector3};
    use parking_lot::Mutex;
    use sync_engine::{DeadReckoningBackend, FusionNode};

    pub const G: f64 = 9.81;

    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<OutputEvent>>,
    }

    impl RecordingSink {
        pub fn count(&self, topic: &str) -> usize {
            self.events
                .lock()
                .iter()
                .filter(|e| e.topic() == topic)
                .count()
        }
    }

    impl OutputSink for RecordingSink {
        fn publish(&self, event: OutputEvent) {
            self.events.lock().push(event);
        }
    }

    pub type TestNode = FusionNode<DeadReckoningBackend, Arc<RecordingSink>>;

    pub fn node(config: SyncEngineConfig) -> (TestNode, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let backend = DeadReckoningBackend::new(EstimatorConfig {
            warmup_frames: 0,
            ..Default::default()
        });
        (FusionNode::new(config, backend, Arc::clone(&sink)), sink)
    }

    pub fn imu(t: f64, accel: Vector3<f64>) -> ImuSample {
        ImuSample::new(t, accel, Vector3::zeros())
    }

    pub fn at_rest(t: f64) -> ImuSample {
        imu(t, Vector3::new(0.0, 0.0, G))
    }

    pub fn frame(t: f64) -> FeatureFrame {
        FeatureFrame::new(
            t,
            (0..4)
                .map(|i| FeatureObservation {
                    feature_id: i,
                    camera_id: 0,
                    point: Vector3::new(0.1 * i as f64, 0.0, 1.0),
                    pixel: Vector2::new(320.0 + 46.0 * i as f64, 240.0),
                    velocity: Vector2::zeros(),
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod scenario_tests {
    use contracts::{
        ClockCalibration, SatelliteBatch, SatelliteWaitPolicy, SyncEngineConfig, TimePulse,
    };
    use nalgebra::Vector3;
    use sync_engine::{ImuPredictor, WaitReason};

    use crate::fixtures::*;

    fn gnss_config(satellite_wait: SatelliteWaitPolicy) -> SyncEngineConfig {
        SyncEngineConfig {
            gnss_enabled: true,
            clock: ClockCalibration::Static { offset: 0.0 },
            satellite_wait,
            ..Default::default()
        }
    }

    /// Inertial data around t = 10.0 so one image at 10.0 is bracketed
    fn feed_inertial_around_ten(node: &TestNode) {
        for i in 0..=20 {
            node.on_imu(at_rest((995 + i) as f64 / 100.0));
        }
    }

    #[test]
    fn test_gravity_only_window_and_prediction() {
        let (node, _sink) = node(SyncEngineConfig::default());
        for i in 0..=10 {
            node.on_imu(at_rest(i as f64 / 100.0));
        }
        node.on_features(frame(0.05));

        let bundle = node.try_next_bundle().unwrap();
        let times: Vec<f64> = bundle.inertial.iter().map(|s| s.timestamp).collect();
        assert_eq!(times, vec![0.0, 0.01, 0.02, 0.03, 0.04, 0.05, 0.06]);
        assert!(node.process_bundle(bundle).is_some());

        let state = node.predictor_state();
        assert_eq!(state.latest_time, Some(0.1));
        assert!(state.nav.velocity.norm() < 1e-9);
        assert!(state.nav.position.norm() < 1e-9);
        assert!(state.nav.orientation.angle() < 1e-12);
    }

    #[test]
    fn test_every_window_brackets_its_image() {
        let (node, _sink) = node(SyncEngineConfig::default());
        for i in 0..=200 {
            node.on_imu(at_rest(i as f64 / 200.0));
        }
        // camera phase deliberately off the inertial grid
        for k in 0..18 {
            node.on_features(frame(0.013 + k as f64 / 20.0));
        }

        let mut bundles = 0;
        while let Ok(bundle) = node.try_next_bundle() {
            let (last, rest) = bundle.inertial.split_last().unwrap();
            assert!(last.timestamp > bundle.image_time);
            assert!(rest.iter().all(|s| s.timestamp <= bundle.image_time));
            assert!(node.process_bundle(bundle).is_some());
            bundles += 1;
        }
        assert_eq!(bundles, 18);
    }

    #[test]
    fn test_satellite_within_tolerance_matched_once() {
        let (node, _sink) = node(gnss_config(SatelliteWaitPolicy::Block));
        feed_inertial_around_ten(&node);
        node.on_satellites(SatelliteBatch::new(10.03, vec![]));
        node.on_features(frame(10.0));
        node.on_features(frame(10.05));

        let first = node.try_next_bundle().unwrap();
        assert_eq!(first.satellites.map(|b| b.time), Some(10.03));
        assert_eq!(node.buffer_depths().2, 0);

        // the batch is gone; the next image waits for fresh satellite data
        assert_eq!(node.try_next_bundle().unwrap_err(), WaitReason::NoSatellites);
    }

    #[test]
    fn test_stale_satellite_dropped() {
        let (node, _sink) = node(gnss_config(SatelliteWaitPolicy::Block));
        feed_inertial_around_ten(&node);
        node.on_satellites(SatelliteBatch::new(9.90, vec![]));
        node.on_features(frame(10.0));

        assert_eq!(
            node.try_next_bundle().unwrap_err(),
            WaitReason::SatellitesStale
        );
        assert_eq!(node.buffer_depths().2, 0);
        assert_eq!(node.sync_stats().batches_dropped, 1);

        // a fresh batch releases the held image
        node.on_satellites(SatelliteBatch::new(10.01, vec![]));
        let bundle = node.try_next_bundle().unwrap();
        assert_eq!(bundle.satellites.map(|b| b.time), Some(10.01));
    }

    #[test]
    fn test_stale_satellite_dropped_without_blocking() {
        let (node, _sink) = node(gnss_config(SatelliteWaitPolicy::ProceedWithoutSatellites));
        feed_inertial_around_ten(&node);
        node.on_satellites(SatelliteBatch::new(9.90, vec![]));
        node.on_features(frame(10.0));

        let bundle = node.try_next_bundle().unwrap();
        assert!(bundle.satellites.is_none());
        assert_eq!(node.buffer_depths().2, 0);
    }

    #[test]
    fn test_future_satellite_left_for_later_image() {
        let (node, _sink) = node(gnss_config(SatelliteWaitPolicy::Block));
        feed_inertial_around_ten(&node);
        node.on_satellites(SatelliteBatch::new(10.20, vec![]));
        node.on_features(frame(10.0));

        let bundle = node.try_next_bundle().unwrap();
        assert!(bundle.satellites.is_none());
        assert_eq!(node.buffer_depths().2, 1);
    }

    /// A second pulse/trigger pair moves the offset; the next image is matched
    /// against the new relation, not the one in force for the previous bundle.
    #[test]
    fn test_offset_change_between_bundles() {
        const GNSS_BASE: f64 = 1_000_000_000.0;
        let (node, _sink) = node(SyncEngineConfig {
            gnss_enabled: true,
            clock: ClockCalibration::Online,
            ..Default::default()
        });
        node.on_time_pulse(TimePulse::from_gps_seconds(GNSS_BASE + 10.0));
        node.on_local_trigger(10.0);
        feed_inertial_around_ten(&node);

        node.on_satellites(SatelliteBatch::new(GNSS_BASE + 10.03, vec![]));
        node.on_features(frame(10.0));
        let first = node.try_next_bundle().unwrap();
        let matched = first.satellites.as_ref().map(|b| b.time).unwrap();
        assert!((matched - (GNSS_BASE + 10.03)).abs() < 1e-6);

        // offset grows by 0.1 s
        node.on_time_pulse(TimePulse::from_gps_seconds(GNSS_BASE + 10.2));
        node.on_local_trigger(10.1);
        let offset = node.clock_offset().unwrap();
        assert!((offset - (GNSS_BASE + 0.1)).abs() < 1e-6);
        assert!(node
            .with_backend(|b| b.clock_offset())
            .is_some_and(|o| (o - offset).abs() < 1e-9));

        // 10.13 would match image 10.1 under the old offset; 10.22 matches the new one
        node.on_satellites(SatelliteBatch::new(GNSS_BASE + 10.13, vec![]));
        node.on_satellites(SatelliteBatch::new(GNSS_BASE + 10.22, vec![]));
        node.on_features(frame(10.1));

        let second = node.try_next_bundle().unwrap();
        let matched = second.satellites.as_ref().map(|b| b.time).unwrap();
        assert!((matched - (GNSS_BASE + 10.22)).abs() < 1e-6);

        let stats = node.sync_stats();
        assert_eq!(stats.batches_matched, 2);
        assert_eq!(stats.batches_dropped, 1);
        assert_eq!(node.buffer_depths().2, 0);
    }

    #[test]
    fn test_satellites_irrelevant_when_disabled() {
        let (node, _sink) = node(SyncEngineConfig::default());
        feed_inertial_around_ten(&node);
        node.on_satellites(SatelliteBatch::new(10.0, vec![]));
        node.on_features(frame(10.0));

        let bundle = node.try_next_bundle().unwrap();
        assert!(bundle.satellites.is_none());
        assert_eq!(node.buffer_depths().2, 0);
    }

    #[test]
    fn test_consecutive_out_of_order_pushes() {
        let (node, _sink) = node(SyncEngineConfig::default());
        node.on_imu(at_rest(5.0));
        node.on_imu(at_rest(4.9));
        node.on_imu(at_rest(4.8));
        assert_eq!(node.buffered_imu_timestamps(), vec![5.0]);
    }

    #[test]
    fn test_decimator_halves_camera_rate() {
        let (node, _sink) = node(gnss_config(SatelliteWaitPolicy::Block));
        node.on_satellites(SatelliteBatch::new(10.0, vec![]));

        // 9.95 and 10.00 are compared; 10.00 sits on the epoch so its parity is kept
        for k in 0..6 {
            node.on_features(frame((995 + 5 * k) as f64 / 100.0));
        }
        // admitted: 9.95, 10.00, 10.10, 10.20
        assert_eq!(node.buffer_depths().1, 4);
    }

    #[test]
    fn test_rebase_matches_manual_replay() {
        let (node, _sink) = node(SyncEngineConfig::default());
        let accel = Vector3::new(0.5, -0.2, G);
        let samples: Vec<_> = (0..=20).map(|i| imu(i as f64 / 100.0, accel)).collect();
        for sample in &samples {
            node.on_imu(*sample);
        }
        node.on_features(frame(0.055));

        let bundle = node.try_next_bundle().unwrap();
        let image_time = bundle.image_time;
        node.process_bundle(bundle);

        let confirmed = node.with_backend(|b| contracts::EstimatorBackend::confirmed_state(b));
        let mut manual = ImuPredictor::new(Vector3::new(0.0, 0.0, G));
        manual.rebase(
            &confirmed,
            image_time,
            samples.iter().filter(|s| s.timestamp > image_time),
        );

        let predicted = node.predictor_state();
        assert_eq!(predicted.latest_time, Some(0.2));
        assert!((predicted.nav.position - manual.state().nav.position).norm() < 1e-12);
        assert!((predicted.nav.velocity - manual.state().nav.velocity).norm() < 1e-12);
        // forward motion happened and was carried past the image time
        assert!(predicted.nav.velocity.x > confirmed.nav.velocity.x);
    }

    #[test]
    fn test_restart_discards_partial_state() {
        let (node, _sink) = node(SyncEngineConfig::default());
        for i in 0..=10 {
            node.on_imu(at_rest(i as f64 / 100.0));
        }
        node.on_features(frame(0.05));
        node.on_features(frame(0.08));
        let in_flight = node.try_next_bundle().unwrap();

        node.on_restart(true);
        assert_eq!(node.buffer_depths(), (0, 0, 0));
        assert!(node.process_bundle(in_flight).is_none());
        assert_eq!(node.try_next_bundle().unwrap_err(), WaitReason::NoInertial);

        // timestamps restart from zero after a reset
        node.on_imu(at_rest(0.0));
        node.on_imu(at_rest(0.01));
        node.on_features(frame(0.005));
        assert!(node.try_next_bundle().is_ok());
    }

    #[test]
    fn test_restart_on_empty_buffers_is_noop() {
        let (node, sink) = node(SyncEngineConfig::default());
        node.on_restart(true);
        node.on_restart(false);
        node.on_restart(true);
        assert_eq!(node.buffer_depths(), (0, 0, 0));
        assert!(!node.solver_ready());
        assert_eq!(sink.count("statistics"), 0);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{
        ClockCalibration, EstimatorConfig, SatelliteWaitPolicy, SinkConfig, SinkType,
        SyncEngineConfig,
    };
    use dispatcher::{create_dispatcher, ChannelPublisher};
    use ingestion::{IngestionPipeline, MockSensorSource, SimClock};
    use sync_engine::{DeadReckoningBackend, FusionNode};

    use crate::fixtures::{node, G};

    const LOCAL_START: f64 = 1.0e9;
    const GNSS_OFFSET: f64 = 18.0;

    fn fast_clock() -> SimClock {
        SimClock::new(LOCAL_START, GNSS_OFFSET).with_time_scale(10.0)
    }

    /// Poll `done` for up to `timeout`
    fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        done()
    }

    /// End-to-end test: mock sources -> FusionNode -> recording sink
    ///
    /// 验证完整的数据流：
    /// 1. Mock 源按仿真时钟生成 IMU/特征/卫星/PPS
    /// 2. 在线时钟同步标定偏移
    /// 3. 消费线程产出带卫星的测量包
    #[test]
    fn test_e2e_online_clock_matches_satellites() {
        let (node, sink) = node(SyncEngineConfig {
            gnss_enabled: true,
            clock: ClockCalibration::Online,
            satellite_wait: SatelliteWaitPolicy::ProceedWithoutSatellites,
            ..Default::default()
        });

        let clock = fast_clock();
        let mut ingestion = IngestionPipeline::new(Arc::new(node.clone()));
        ingestion
            .register_source(Box::new(MockSensorSource::imu("imu", clock, 200.0, G, 0.0)))
            .unwrap();
        ingestion
            .register_source(Box::new(MockSensorSource::features("cam", clock, 20.0, 16)))
            .unwrap();
        ingestion
            .register_source(Box::new(MockSensorSource::gnss("gnss", clock, 10.0, 6)))
            .unwrap();
        ingestion
            .register_source(Box::new(MockSensorSource::pps("pps", clock, 5.0)))
            .unwrap();

        let consumer = node.spawn_consumer().unwrap();
        ingestion.start_all();

        let matched = wait_for(Duration::from_secs(10), || {
            node.sync_stats().batches_matched >= 3
        });

        ingestion.stop_all();
        node.shutdown();
        let processed = consumer.join().unwrap();

        assert!(matched, "stats: {:?}", node.sync_stats());
        assert!(processed >= 3);
        let offset = node.clock_offset().unwrap();
        assert!((offset - GNSS_OFFSET).abs() < 1e-3, "offset {offset}");
        assert!(node.with_backend(|b| b.ephemerides()) >= 6);
        assert!(node.with_backend(|b| b.iono_params().is_some()));
        assert!(sink.count("statistics") as u64 >= processed);
        assert!(sink.count("latest_pose") > 0);

        let snapshot = ingestion.metrics().snapshot();
        assert!(snapshot.total_received() > 0);
        assert!(snapshot.received(contracts::SensorChannel::Imu) > 0);
    }

    /// Camera at twice the satellite rate gets decimated once the clock is known
    #[test]
    fn test_e2e_static_clock_decimates_images() {
        let (node, _sink) = node(SyncEngineConfig {
            gnss_enabled: true,
            clock: ClockCalibration::Static {
                offset: GNSS_OFFSET,
            },
            ..Default::default()
        });

        let clock = fast_clock();
        let mut ingestion = IngestionPipeline::new(Arc::new(node.clone()));
        ingestion
            .register_source(Box::new(MockSensorSource::imu("imu", clock, 200.0, G, 0.0)))
            .unwrap();
        ingestion
            .register_source(Box::new(MockSensorSource::gnss("gnss", clock, 10.0, 4)))
            .unwrap();
        ingestion
            .register_source(Box::new(MockSensorSource::features("cam", clock, 20.0, 9)))
            .unwrap();

        let consumer = node.spawn_consumer().unwrap();
        ingestion.start_all();

        let progressed = wait_for(Duration::from_secs(10), || node.sync_stats().bundles >= 6);

        ingestion.stop_all();
        node.shutdown();
        consumer.join().unwrap();

        assert!(progressed, "stats: {:?}", node.sync_stats());
        let images = ingestion
            .metrics()
            .snapshot()
            .received(contracts::SensorChannel::Features);
        let stats = node.sync_stats();
        assert!(node.skip_parity().is_some());
        assert!(
            stats.bundles < images,
            "bundles {} images {}",
            stats.bundles,
            images
        );
        assert!(stats.batches_matched > 0);
    }

    /// Full output path: FusionNode -> ChannelPublisher -> Dispatcher -> FileSink
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_e2e_dispatch_to_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let mut params = HashMap::new();
        params.insert("path".to_string(), dir.path().display().to_string());
        params.insert("timestamped".to_string(), "false".to_string());
        params.insert("topics".to_string(), "odometry,statistics".to_string());

        let sinks = vec![
            SinkConfig {
                name: "files".to_string(),
                sink_type: SinkType::File,
                queue_capacity: 8192,
                params,
            },
            SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: 256,
                params: HashMap::new(),
            },
        ];

        let (publisher, rx) = ChannelPublisher::channel(16_384);
        let publisher = Arc::new(publisher);
        let dispatcher = create_dispatcher(sinks, rx).await.unwrap();
        let dispatcher_handle = dispatcher.spawn();

        let node = FusionNode::new(
            SyncEngineConfig::default(),
            DeadReckoningBackend::new(EstimatorConfig {
                warmup_frames: 2,
                ..Default::default()
            }),
            Arc::clone(&publisher),
        );

        let clock = fast_clock();
        let mut ingestion = IngestionPipeline::new(Arc::new(node.clone()));
        ingestion
            .register_source(Box::new(MockSensorSource::imu("imu", clock, 200.0, G, 0.01)))
            .unwrap();
        ingestion
            .register_source(Box::new(MockSensorSource::features("cam", clock, 20.0, 25)))
            .unwrap();

        let consumer = node.spawn_consumer().unwrap();
        ingestion.start_all();

        let probe = node.clone();
        let reached = tokio::task::spawn_blocking(move || {
            wait_for(Duration::from_secs(10), || probe.sync_stats().bundles >= 8)
        })
        .await
        .unwrap();
        assert!(reached);

        ingestion.stop_all();
        node.shutdown();
        consumer.join().unwrap();

        drop(ingestion);
        drop(node);
        drop(publisher);

        let metrics = tokio::time::timeout(Duration::from_secs(5), dispatcher_handle)
            .await
            .unwrap()
            .unwrap();
        let files = &metrics.iter().find(|(name, _)| name == "files").unwrap().1;
        assert!(files.write_count > 0);
        assert!(files.filtered_count > 0);

        let statistics = std::fs::read_to_string(dir.path().join("statistics.jsonl")).unwrap();
        let lines: Vec<&str> = statistics.lines().collect();
        assert!(lines.len() >= 8);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert!(first.is_object());

        assert!(dir.path().join("odometry.jsonl").exists());
        assert!(!dir.path().join("latest_pose.jsonl").exists());
    }
}
