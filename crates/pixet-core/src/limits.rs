//! Detector-wide bounds and default timings.
//!
//! This module centralizes:
//! - Exposure and latency bounds reported to the host
//! - Energy threshold range
//! - Timeouts for stopping and starting acquisitions

use std::time::Duration;

use crate::error::{CameraError, CameraResult};
use crate::hw::ValidRanges;

// =============================================================================
// Synchronisation Bounds
// =============================================================================

/// Shortest exposure accepted, in seconds.
pub const MIN_EXPOSURE_S: f64 = 1e-7;
/// Longest exposure accepted, in seconds.
pub const MAX_EXPOSURE_S: f64 = 1e6;
/// Shortest latency, in seconds. The detectors have no configurable latency.
pub const MIN_LATENCY_S: f64 = 0.0;
/// Longest latency, in seconds.
pub const MAX_LATENCY_S: f64 = 0.0;

/// Exposure and latency bounds as reported to the host.
pub const VALID_RANGES: ValidRanges = ValidRanges {
    min_exp_time: MIN_EXPOSURE_S,
    max_exp_time: MAX_EXPOSURE_S,
    min_lat_time: MIN_LATENCY_S,
    max_lat_time: MAX_LATENCY_S,
};

// =============================================================================
// Sensor
// =============================================================================

/// Pixel pitch in metres (55 um square).
pub const PIXEL_SIZE_M: f64 = 55e-6;

/// Upper bound of every energy threshold, in keV.
pub const MAX_ENERGY_THRESHOLD_KEV: f64 = 120.0;
/// Lower bound of every energy threshold, in keV.
pub const MIN_ENERGY_THRESHOLD_KEV: f64 = 0.0;

// =============================================================================
// Timeouts
// =============================================================================

/// Default bound on joining the acquisition worker after an abort.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between spawning the worker and the first software trigger.
///
/// The SDK needs the blocking acquisition call to be armed before it accepts
/// a trigger.
pub const DEFAULT_START_SETTLE: Duration = Duration::from_millis(30);

/// Validate an energy threshold in keV.
pub fn validate_energy_threshold(parameter: &str, kev: f64) -> CameraResult<f64> {
    if !(MIN_ENERGY_THRESHOLD_KEV..=MAX_ENERGY_THRESHOLD_KEV).contains(&kev) {
        return Err(CameraError::validation(
            parameter,
            format!(
                "{} keV outside range = [{},{}] keV",
                kev, MIN_ENERGY_THRESHOLD_KEV, MAX_ENERGY_THRESHOLD_KEV
            ),
        ));
    }
    Ok(kev)
}

/// Validate an exposure time in seconds.
pub fn validate_exposure(exp_time: f64) -> CameraResult<f64> {
    if !(MIN_EXPOSURE_S..=MAX_EXPOSURE_S).contains(&exp_time) {
        return Err(CameraError::validation(
            "exposure_time",
            format!(
                "{} s outside range = [{:e},{:e}] s",
                exp_time, MIN_EXPOSURE_S, MAX_EXPOSURE_S
            ),
        ));
    }
    Ok(exp_time)
}
