//! GNSS time-pulse normalization.
//!
//! Every GNSS timestamp inside the pipeline is GPS time expressed in seconds on
//! the Unix-epoch scale, so it can be compared with local sensor stamps after
//! adding the clock offset.

use serde::{Deserialize, Serialize};

use crate::ContractError;

pub const SECONDS_PER_WEEK: f64 = 604_800.0;

/// 1980-01-06T00:00:00 (GPS epoch) as Unix seconds
pub const GPS_EPOCH_UNIX: f64 = 315_964_800.0;

/// 1999-08-22T00:00:00 (Galileo system time epoch, GPS week 1024)
pub const GST_EPOCH_UNIX: f64 = 935_280_000.0;

/// 2006-01-01T00:00:00 (BeiDou time epoch)
pub const BDT_EPOCH_UNIX: f64 = 1_136_073_600.0;

/// GPST - BDT
pub const BDT_TO_GPST: f64 = 14.0;

/// (UTC Unix seconds at which the step applies, GPS - UTC after it)
const LEAP_SECONDS: &[(f64, f64)] = &[
    (1_483_228_800.0, 18.0), // 2017-01-01
    (1_435_708_800.0, 17.0), // 2015-07-01
    (1_341_100_800.0, 16.0), // 2012-07-01
    (1_230_768_000.0, 15.0), // 2009-01-01
    (1_136_073_600.0, 14.0), // 2006-01-01
    (915_148_800.0, 13.0),   // 1999-01-01
];

/// Time system a pulse report is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSystem {
    #[default]
    Gps,
    Glonass,
    Galileo,
    Beidou,
    /// Receiver has not resolved a time system yet
    None,
}

/// GNSS time-pulse report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePulse {
    pub week: u32,
    /// Time of week (seconds)
    pub tow: f64,
    pub time_system: TimeSystem,
    /// Week/tow are UTC-aligned rather than native to `time_system`
    #[serde(default)]
    pub utc_based: bool,
}

impl TimePulse {
    /// Pulse expressed directly in GPS time.
    pub fn from_gps_seconds(gps_seconds: f64) -> Self {
        let since_epoch = gps_seconds - GPS_EPOCH_UNIX;
        let week = (since_epoch / SECONDS_PER_WEEK).floor();
        Self {
            week: week as u32,
            tow: since_epoch - week * SECONDS_PER_WEEK,
            time_system: TimeSystem::Gps,
            utc_based: false,
        }
    }

    /// Normalize to GPS seconds.
    ///
    /// # Errors
    /// [`ContractError::UnknownTimeSystem`] when the receiver reports no time system.
    pub fn to_gps_seconds(&self) -> Result<f64, ContractError> {
        let in_week = self.week as f64 * SECONDS_PER_WEEK + self.tow;
        match self.time_system {
            _ if self.utc_based => Ok(utc_to_gpst(GPS_EPOCH_UNIX + in_week)),
            TimeSystem::Glonass => Ok(utc_to_gpst(GPS_EPOCH_UNIX + in_week)),
            TimeSystem::Gps => Ok(GPS_EPOCH_UNIX + in_week),
            TimeSystem::Galileo => Ok(GST_EPOCH_UNIX + in_week),
            TimeSystem::Beidou => Ok(BDT_EPOCH_UNIX + in_week + BDT_TO_GPST),
            TimeSystem::None => Err(ContractError::UnknownTimeSystem {
                week: self.week,
                tow: self.tow,
            }),
        }
    }
}

/// GPS - UTC leap seconds in effect at the given UTC instant.
pub fn leap_seconds(utc: f64) -> f64 {
    LEAP_SECONDS
        .iter()
        .find(|(since, _)| utc >= *since)
        .map(|(_, leap)| *leap)
        .unwrap_or(13.0)
}

/// Convert a UTC instant (Unix seconds) to GPS time on the same scale.
pub fn utc_to_gpst(utc: f64) -> f64 {
    utc + leap_seconds(utc)
}
