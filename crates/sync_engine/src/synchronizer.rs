//! Measurement synchronizer: decides which image is bundled with which
//! inertial window and which satellite batch.
//!
//! Evaluated under the buffer lock. Never blocks: it either consumes exactly
//! one image and returns a bundle, or reports why it cannot yet.

use std::fmt;

use contracts::{SatelliteWaitPolicy, SyncEngineConfig};
use tracing::{instrument, warn};

use crate::buffers::IngestBuffers;
use crate::bundle::MeasurementBundle;

/// Why no bundle could be formed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitReason {
    NoInertial,
    NoImage,
    NoSatellites,
    /// Newest inertial sample does not reach past the oldest image yet
    InertialLagging,
    /// Clock offset not calibrated yet
    CalibrationPending,
    /// Every buffered satellite batch was too old for the image
    SatellitesStale,
}

impl WaitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoInertial => "no_inertial",
            Self::NoImage => "no_image",
            Self::NoSatellites => "no_satellites",
            Self::InertialLagging => "inertial_lagging",
            Self::CalibrationPending => "calibration_pending",
            Self::SatellitesStale => "satellites_stale",
        }
    }
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one `try_bundle`
#[derive(Debug)]
pub enum BundleStatus {
    Ready(Box<MeasurementBundle>),
    NotReady(WaitReason),
}

impl BundleStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Synchronizer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub bundles: u64,
    /// Times the inertial stream lagged the oldest image
    pub waits: u64,
    pub images_dropped: u64,
    pub batches_dropped: u64,
    pub batches_matched: u64,
}

/// Bundling state machine over the ingest buffers
#[derive(Debug)]
pub struct MeasurementSynchronizer {
    gnss_enabled: bool,
    tolerance: f64,
    satellite_wait: SatelliteWaitPolicy,
    stats: SyncStats,
}

impl MeasurementSynchronizer {
    pub fn new(config: &SyncEngineConfig) -> Self {
        Self {
            gnss_enabled: config.gnss_enabled,
            tolerance: config.max_gnss_camera_delay,
            satellite_wait: config.satellite_wait,
            stats: SyncStats::default(),
        }
    }

    /// Try to form the next bundle.
    ///
    /// * `clock_offset` - local -> GNSS offset read once for this attempt
    /// * `td` - backend camera/IMU time offset
    /// * `generation` - restart generation stamped on the bundle
    #[instrument(
        level = "trace",
        name = "sync_try_bundle",
        skip(self, buffers),
        fields(imu = buffers.imu.len(), images = buffers.features.len(), satellites = buffers.satellites.len())
    )]
    pub fn try_bundle(
        &mut self,
        buffers: &mut IngestBuffers,
        clock_offset: Option<f64>,
        td: f64,
        generation: u64,
    ) -> BundleStatus {
        if buffers.imu.is_empty() {
            return BundleStatus::NotReady(WaitReason::NoInertial);
        }
        if buffers.features.is_empty() {
            return BundleStatus::NotReady(WaitReason::NoImage);
        }
        let use_satellites = self.gnss_enabled
            && !(buffers.satellites.is_empty()
                && self.satellite_wait == SatelliteWaitPolicy::ProceedWithoutSatellites);
        if use_satellites && buffers.satellites.is_empty() {
            return BundleStatus::NotReady(WaitReason::NoSatellites);
        }

        if let Some(reason) = self.align_images(buffers, td) {
            return BundleStatus::NotReady(reason);
        }

        let satellites = if use_satellites {
            let Some(offset) = clock_offset else {
                return BundleStatus::NotReady(WaitReason::CalibrationPending);
            };
            match self.match_satellites(buffers, offset) {
                Ok(batch) => batch,
                Err(reason) => return BundleStatus::NotReady(reason),
            }
        } else {
            None
        };

        let Some(image) = buffers.features.pop_front() else {
            return BundleStatus::NotReady(WaitReason::NoImage);
        };
        let image_time = image.timestamp + td;

        let mut inertial = Vec::new();
        while buffers
            .imu
            .front_timestamp()
            .is_some_and(|t| t <= image_time)
        {
            if let Some(sample) = buffers.imu.pop_front() {
                inertial.push(sample);
            }
        }
        // bracketing sample stays buffered for the next window and the predictor
        if let Some(next) = buffers.imu.front() {
            inertial.push(*next);
        }

        self.stats.bundles += 1;
        metrics::counter!("gvio_sync_bundles_total").increment(1);

        BundleStatus::Ready(Box::new(MeasurementBundle {
            generation,
            image,
            image_time,
            inertial,
            satellites,
        }))
    }

    /// Drop images the inertial stream can never cover and check that the
    /// newest inertial sample reaches past the oldest remaining image.
    fn align_images(&mut self, buffers: &mut IngestBuffers, td: f64) -> Option<WaitReason> {
        loop {
            let image_time = buffers.features.front_timestamp()? + td;
            let newest_imu = buffers.imu.back_timestamp()?;
            if newest_imu <= image_time {
                self.stats.waits += 1;
                metrics::counter!("gvio_sync_waits_total", "reason" => "inertial_lagging")
                    .increment(1);
                return Some(WaitReason::InertialLagging);
            }

            let oldest_imu = buffers.imu.front_timestamp()?;
            if oldest_imu <= image_time {
                return None;
            }

            warn!(
                image_time,
                oldest_imu, "throwing image older than the inertial window"
            );
            buffers.features.pop_front();
            self.stats.images_dropped += 1;
            metrics::counter!("gvio_sync_stale_drops_total", "kind" => "image").increment(1);
            if buffers.features.is_empty() {
                return Some(WaitReason::NoImage);
            }
        }
    }

    /// Drop stale batches and consume the one matching the oldest image.
    fn match_satellites(
        &mut self,
        buffers: &mut IngestBuffers,
        offset: f64,
    ) -> Result<Option<contracts::SatelliteBatch>, WaitReason> {
        let Some(local_time) = buffers.features.front_timestamp() else {
            return Err(WaitReason::NoImage);
        };
        let gnss_image_time = local_time + offset;

        while let Some(batch_time) = buffers.satellites.front_timestamp() {
            if batch_time >= gnss_image_time - self.tolerance {
                break;
            }
            warn!(
                batch_time,
                gnss_image_time, "throwing satellite batch older than the image"
            );
            buffers.satellites.pop_front();
            self.stats.batches_dropped += 1;
            metrics::counter!("gvio_sync_stale_drops_total", "kind" => "satellites").increment(1);
        }

        let Some(batch_time) = buffers.satellites.front_timestamp() else {
            return match self.satellite_wait {
                SatelliteWaitPolicy::Block => Err(WaitReason::SatellitesStale),
                SatelliteWaitPolicy::ProceedWithoutSatellites => Ok(None),
            };
        };

        if (batch_time - gnss_image_time).abs() < self.tolerance {
            self.stats.batches_matched += 1;
            Ok(buffers.satellites.pop_front())
        } else {
            Ok(None)
        }
    }

    #[inline]
    pub fn stats(&self) -> SyncStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{BufferConfig, FeatureFrame, ImuSample, SatelliteBatch};
    use nalgebra::Vector3;

    fn imu(t: f64) -> ImuSample {
        ImuSample::new(t, Vector3::new(0.0, 0.0, 9.81), Vector3::zeros())
    }

    fn config(gnss_enabled: bool) -> SyncEngineConfig {
        SyncEngineConfig {
            gnss_enabled,
            ..Default::default()
        }
    }

    fn buffers() -> IngestBuffers {
        IngestBuffers::new(&BufferConfig::default())
    }

    fn fill_imu(buffers: &mut IngestBuffers, start: f64, end: f64, step: f64) {
        let n = ((end - start) / step).round() as usize;
        for i in 0..=n {
            buffers.imu.push(imu(start + i as f64 * step));
        }
    }

    fn expect_ready(status: BundleStatus) -> MeasurementBundle {
        match status {
            BundleStatus::Ready(bundle) => *bundle,
            BundleStatus::NotReady(reason) => panic!("expected bundle, got {reason}"),
        }
    }

    #[test]
    fn test_window_brackets_image() {
        let mut buf = buffers();
        fill_imu(&mut buf, 0.0, 0.10, 0.01);
        buf.features.push(FeatureFrame::new(0.045, vec![]));

        let mut sync = MeasurementSynchronizer::new(&config(false));
        let bundle = expect_ready(sync.try_bundle(&mut buf, None, 0.0, 0));

        let times: Vec<f64> = bundle.inertial.iter().map(|s| s.timestamp).collect();
        let (last, rest) = times.split_last().unwrap();
        assert!(rest.iter().all(|t| *t <= 0.045));
        assert!(*last > 0.045);
        assert_eq!(rest.len(), 5);

        // peeked sample remains at the head of the buffer
        assert_eq!(buf.imu.front_timestamp(), Some(*last));
        assert!(buf.features.is_empty());
    }

    #[test]
    fn test_not_ready_until_inertial_passes_image() {
        let mut buf = buffers();
        fill_imu(&mut buf, 0.0, 0.05, 0.01);
        buf.features.push(FeatureFrame::new(0.05, vec![]));

        let mut sync = MeasurementSynchronizer::new(&config(false));
        assert!(matches!(
            sync.try_bundle(&mut buf, None, 0.0, 0),
            BundleStatus::NotReady(WaitReason::InertialLagging)
        ));
        assert_eq!(sync.stats().waits, 1);
        assert_eq!(buf.features.len(), 1);

        buf.imu.push(imu(0.06));
        assert!(sync.try_bundle(&mut buf, None, 0.0, 0).is_ready());
    }

    #[test]
    fn test_missing_inputs() {
        let mut sync = MeasurementSynchronizer::new(&config(true));
        let mut buf = buffers();
        assert!(matches!(
            sync.try_bundle(&mut buf, Some(0.0), 0.0, 0),
            BundleStatus::NotReady(WaitReason::NoInertial)
        ));

        buf.imu.push(imu(1.0));
        assert!(matches!(
            sync.try_bundle(&mut buf, Some(0.0), 0.0, 0),
            BundleStatus::NotReady(WaitReason::NoImage)
        ));

        buf.features.push(FeatureFrame::new(0.5, vec![]));
        assert!(matches!(
            sync.try_bundle(&mut buf, Some(0.0), 0.0, 0),
            BundleStatus::NotReady(WaitReason::NoSatellites)
        ));
    }

    #[test]
    fn test_drops_images_older_than_inertial() {
        let mut buf = buffers();
        buf.features.push(FeatureFrame::new(0.01, vec![]));
        buf.features.push(FeatureFrame::new(0.02, vec![]));
        buf.features.push(FeatureFrame::new(0.07, vec![]));
        fill_imu(&mut buf, 0.05, 0.10, 0.01);

        let mut sync = MeasurementSynchronizer::new(&config(false));
        let bundle = expect_ready(sync.try_bundle(&mut buf, None, 0.0, 0));

        assert_eq!(bundle.image.timestamp, 0.07);
        assert_eq!(sync.stats().images_dropped, 2);
    }

    #[test]
    fn test_fusion_disabled_ignores_satellites() {
        let mut buf = buffers();
        fill_imu(&mut buf, 0.0, 0.10, 0.01);
        buf.features.push(FeatureFrame::new(0.05, vec![]));
        buf.satellites.push(SatelliteBatch::new(0.05, vec![]));

        let mut sync = MeasurementSynchronizer::new(&config(false));
        let bundle = expect_ready(sync.try_bundle(&mut buf, None, 0.0, 0));
        assert!(bundle.satellites.is_none());
        assert_eq!(buf.satellites.len(), 1);
    }

    #[test]
    fn test_satellite_association() {
        let mut buf = buffers();
        fill_imu(&mut buf, 9.95, 10.10, 0.01);
        buf.features.push(FeatureFrame::new(10.000, vec![]));
        buf.satellites.push(SatelliteBatch::new(9.900, vec![]));
        buf.satellites.push(SatelliteBatch::new(10.030, vec![]));
        buf.satellites.push(SatelliteBatch::new(10.200, vec![]));

        let mut sync = MeasurementSynchronizer::new(&config(true));
        let bundle = expect_ready(sync.try_bundle(&mut buf, Some(0.0), 0.0, 0));

        assert_eq!(bundle.satellites.map(|b| b.time), Some(10.030));
        assert_eq!(buf.satellites.len(), 1);
        assert_eq!(buf.satellites.front_timestamp(), Some(10.200));
        let stats = sync.stats();
        assert_eq!(stats.batches_dropped, 1);
        assert_eq!(stats.batches_matched, 1);
    }

    #[test]
    fn test_newer_batch_left_for_later_image() {
        let mut buf = buffers();
        fill_imu(&mut buf, 9.95, 10.10, 0.01);
        buf.features.push(FeatureFrame::new(10.000, vec![]));
        buf.satellites.push(SatelliteBatch::new(10.200, vec![]));

        let mut sync = MeasurementSynchronizer::new(&config(true));
        let bundle = expect_ready(sync.try_bundle(&mut buf, Some(0.0), 0.0, 0));
        assert!(bundle.satellites.is_none());
        assert_eq!(buf.satellites.len(), 1);
    }

    #[test]
    fn test_clock_offset_applied_to_image() {
        let mut buf = buffers();
        fill_imu(&mut buf, 0.95, 1.10, 0.01);
        buf.features.push(FeatureFrame::new(1.0, vec![]));
        buf.satellites.push(SatelliteBatch::new(19.01, vec![]));

        let mut sync = MeasurementSynchronizer::new(&config(true));
        assert!(matches!(
            sync.try_bundle(&mut buf, None, 0.0, 0),
            BundleStatus::NotReady(WaitReason::CalibrationPending)
        ));

        let bundle = expect_ready(sync.try_bundle(&mut buf, Some(18.0), 0.0, 0));
        assert!(bundle.satellites.is_some());
    }

    #[test]
    fn test_stale_satellites_block_by_default() {
        let mut buf = buffers();
        fill_imu(&mut buf, 9.95, 10.10, 0.01);
        buf.features.push(FeatureFrame::new(10.0, vec![]));
        buf.satellites.push(SatelliteBatch::new(9.5, vec![]));

        let mut sync = MeasurementSynchronizer::new(&config(true));
        assert!(matches!(
            sync.try_bundle(&mut buf, Some(0.0), 0.0, 0),
            BundleStatus::NotReady(WaitReason::SatellitesStale)
        ));
        assert!(buf.satellites.is_empty());
        assert_eq!(buf.features.len(), 1);
    }

    #[test]
    fn test_proceed_without_satellites_policy() {
        let mut buf = buffers();
        fill_imu(&mut buf, 9.95, 10.10, 0.01);
        buf.features.push(FeatureFrame::new(10.0, vec![]));

        let mut cfg = config(true);
        cfg.satellite_wait = SatelliteWaitPolicy::ProceedWithoutSatellites;
        let mut sync = MeasurementSynchronizer::new(&cfg);

        let bundle = expect_ready(sync.try_bundle(&mut buf, None, 0.0, 0));
        assert!(bundle.satellites.is_none());
    }

    #[test]
    fn test_td_shifts_window_boundary() {
        let mut buf = buffers();
        fill_imu(&mut buf, 0.0, 0.10, 0.01);
        buf.features.push(FeatureFrame::new(0.045, vec![]));

        let mut sync = MeasurementSynchronizer::new(&config(false));
        let bundle = expect_ready(sync.try_bundle(&mut buf, None, 0.02, 3));

        assert_eq!(bundle.generation, 3);
        assert!((bundle.image_time - 0.065).abs() < 1e-12);
        let last = bundle.inertial.last().unwrap().timestamp;
        assert!((last - 0.07).abs() < 1e-9);
    }
}
