//! Local -> GNSS clock offset calibration.
//!
//! Online mode latches the GNSS time of the last time pulse and turns it into
//! an offset when the matching local trigger arrives. Static mode uses a fixed
//! offset from configuration and never touches the pulse path. With GNSS
//! fusion off the synchronizer stays disengaged and never becomes valid.

use contracts::ClockCalibration;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

#[derive(Debug, Default)]
struct ClockState {
    /// GNSS time of the latest time pulse
    pulse_time: Option<f64>,
    /// `gnss - local`
    offset: Option<f64>,
    /// Number of offsets computed so far
    calibrations: u64,
}

/// Clock synchronizer guarded by its own calibration lock
#[derive(Debug)]
pub struct ClockSynchronizer {
    calibration: ClockCalibration,
    engaged: bool,
    state: Mutex<ClockState>,
}

impl ClockSynchronizer {
    pub fn new(calibration: ClockCalibration, gnss_enabled: bool) -> Self {
        let mut state = ClockState::default();
        match calibration {
            _ if !gnss_enabled => {
                debug!(?calibration, "GNSS fusion disabled, clock calibration disengaged");
            }
            ClockCalibration::Static { offset } => {
                info!(offset, "using static local -> GNSS clock offset");
                metrics::gauge!("gvio_sync_clock_offset_seconds").set(offset);
                state.offset = Some(offset);
            }
            ClockCalibration::Online => {}
        }
        Self {
            calibration,
            engaged: gnss_enabled,
            state: Mutex::new(state),
        }
    }

    /// Offset fixed from configuration, if any
    pub fn static_offset(&self) -> Option<f64> {
        match self.calibration {
            ClockCalibration::Static { offset } if self.engaged => Some(offset),
            _ => None,
        }
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        matches!(self.calibration, ClockCalibration::Static { .. })
    }

    /// Record the GNSS time of a time pulse.
    pub fn on_pulse(&self, gnss_time: f64) {
        if !self.engaged {
            trace!(gnss_time, "GNSS fusion disabled, ignoring time pulse");
            return;
        }
        if self.is_static() {
            debug!(gnss_time, "static clock offset configured, ignoring time pulse");
            return;
        }
        self.state.lock().pulse_time = Some(gnss_time);
    }

    /// Pair a local trigger with the latched pulse.
    ///
    /// Returns the new offset when one was computed.
    pub fn on_local_trigger(&self, local_time: f64) -> Option<f64> {
        if !self.engaged {
            trace!(local_time, "GNSS fusion disabled, ignoring local trigger");
            return None;
        }
        if self.is_static() {
            debug!(local_time, "static clock offset configured, ignoring local trigger");
            return None;
        }

        let mut state = self.state.lock();
        let Some(pulse_time) = state.pulse_time else {
            debug!(local_time, "local trigger before any time pulse");
            return None;
        };

        let offset = pulse_time - local_time;
        if state.offset.is_none() {
            info!(offset, "local and GNSS clocks synchronized");
        }
        state.offset = Some(offset);
        state.calibrations += 1;
        metrics::gauge!("gvio_sync_clock_offset_seconds").set(offset);
        Some(offset)
    }

    /// Current offset, `None` until calibrated
    #[inline]
    pub fn offset(&self) -> Option<f64> {
        self.state.lock().offset
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.offset().is_some()
    }

    #[inline]
    pub fn pulse_time(&self) -> Option<f64> {
        self.state.lock().pulse_time
    }

    #[inline]
    pub fn calibrations(&self) -> u64 {
        self.state.lock().calibrations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_until_pulse_and_trigger() {
        let clock = ClockSynchronizer::new(ClockCalibration::Online, true);
        assert!(!clock.is_valid());

        assert_eq!(clock.on_local_trigger(100.0), None);
        assert!(!clock.is_valid());

        clock.on_pulse(1_000_000_018.0);
        assert!(!clock.is_valid());

        let offset = clock.on_local_trigger(1_000_000_000.0);
        assert_eq!(offset, Some(18.0));
        assert_eq!(clock.offset(), Some(18.0));
    }

    #[test]
    fn test_offset_updates_only_on_new_pair() {
        let clock = ClockSynchronizer::new(ClockCalibration::Online, true);
        clock.on_pulse(20.0);
        clock.on_local_trigger(10.0);

        clock.on_pulse(21.5);
        assert_eq!(clock.offset(), Some(10.0));

        clock.on_local_trigger(11.0);
        assert_eq!(clock.offset(), Some(10.5));
        assert_eq!(clock.calibrations(), 2);
    }

    #[test]
    fn test_static_calibration_valid_immediately() {
        let clock = ClockSynchronizer::new(ClockCalibration::Static { offset: 0.25 }, true);
        assert!(clock.is_valid());
        assert_eq!(clock.offset(), Some(0.25));

        clock.on_pulse(100.0);
        assert_eq!(clock.on_local_trigger(1.0), None);
        assert_eq!(clock.offset(), Some(0.25));
        assert_eq!(clock.pulse_time(), None);
    }

    #[test]
    fn test_disengaged_without_gnss_fusion() {
        let clock = ClockSynchronizer::new(ClockCalibration::Static { offset: 0.25 }, false);
        assert!(!clock.is_valid());
        assert_eq!(clock.static_offset(), None);

        let online = ClockSynchronizer::new(ClockCalibration::Online, false);
        online.on_pulse(20.0);
        assert_eq!(online.on_local_trigger(10.0), None);
        assert_eq!(online.pulse_time(), None);
        assert!(!online.is_valid());
    }
}
