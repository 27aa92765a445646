//! The three ingest queues guarded together by the buffer lock.

use contracts::{BufferConfig, FeatureFrame, ImuSample, SatelliteBatch};

use crate::buffer::TimedQueue;

/// Items removed by a restart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedCounts {
    pub imu: usize,
    pub features: usize,
    pub satellites: usize,
}

/// Inertial, image and satellite queues
#[derive(Debug)]
pub struct IngestBuffers {
    pub imu: TimedQueue<ImuSample>,
    pub features: TimedQueue<FeatureFrame>,
    pub satellites: TimedQueue<SatelliteBatch>,
}

impl IngestBuffers {
    pub fn new(config: &BufferConfig) -> Self {
        Self {
            imu: TimedQueue::new(config.max_size),
            features: TimedQueue::new(config.max_size),
            satellites: TimedQueue::new(config.max_size),
        }
    }

    pub fn clear(&mut self) -> ClearedCounts {
        ClearedCounts {
            imu: self.imu.clear(),
            features: self.features.clear(),
            satellites: self.satellites.clear(),
        }
    }

    /// (imu, features, satellites) depths
    pub fn depths(&self) -> (usize, usize, usize) {
        (self.imu.len(), self.features.len(), self.satellites.len())
    }
}
