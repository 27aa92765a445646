//! Image-rate decimation matching the camera rate to the satellite rate.
//!
//! The camera runs at twice the receiver rate. Once the first image pair can
//! be compared against a satellite epoch, the image parity farther from that
//! epoch is latched and every later image of that parity is dropped.

use tracing::info;

/// Admission decision for one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Drop,
}

#[derive(Debug)]
pub struct RateDecimator {
    enabled: bool,
    counter: u64,
    skip_parity: Option<u64>,
    /// GNSS-compensated time of the previous image seen after calibration
    last_image_time: Option<f64>,
    last_satellite_time: Option<f64>,
}

impl RateDecimator {
    pub fn new(gnss_enabled: bool) -> Self {
        Self {
            enabled: gnss_enabled,
            counter: 0,
            skip_parity: None,
            last_image_time: None,
            last_satellite_time: None,
        }
    }

    /// Track the newest satellite epoch; called for every batch, calibrated or not.
    pub fn observe_satellite_time(&mut self, gnss_time: f64) {
        self.last_satellite_time = Some(gnss_time);
    }

    /// Decide whether an image stamped `local_time` enters the buffer.
    pub fn admit(&mut self, local_time: f64, clock_offset: Option<f64>) -> Admission {
        self.counter += 1;
        if !self.enabled {
            return Admission::Admit;
        }

        if self.skip_parity.is_none() {
            if let Some(offset) = clock_offset {
                self.try_latch(local_time + offset);
            }
        }

        match self.skip_parity {
            Some(parity) if self.counter % 2 == parity => Admission::Drop,
            _ => Admission::Admit,
        }
    }

    fn try_latch(&mut self, image_time: f64) {
        if let (Some(satellite), Some(previous)) = (self.last_satellite_time, self.last_image_time)
        {
            let parity = self.counter % 2;
            let skip = if (image_time - satellite).abs() > (previous - satellite).abs() {
                parity
            } else {
                1 - parity
            };
            info!(
                skip_parity = skip,
                image_time,
                satellite_time = satellite,
                "image decimation latched"
            );
            self.skip_parity = Some(skip);
        }
        self.last_image_time = Some(image_time);
    }

    #[inline]
    pub fn skip_parity(&self) -> Option<u64> {
        self.skip_parity
    }

    #[inline]
    pub fn image_counter(&self) -> u64 {
        self.counter
    }
}
