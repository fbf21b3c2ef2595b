//! Synchronisation capability.
//!
//! Maps the host trigger vocabulary onto the two native trigger modes and holds
//! the frame count and latency until the next prepare.

use std::sync::Arc;

use parking_lot::Mutex;
use pixet_core::limits::{MIN_LATENCY_S, VALID_RANGES};
use pixet_core::{CameraError, CameraResult, SyncCtrl, TrigMode, ValidRanges};
use tracing::debug;

use crate::camera::PixetCamera;
use crate::family::TriggerMode;

#[derive(Debug)]
struct SyncState {
    latency_s: f64,
    nb_frames: u64,
}

/// Synchronisation control over a [`PixetCamera`].
pub struct PixetSyncCtrl {
    camera: Arc<PixetCamera>,
    state: Mutex<SyncState>,
}

impl PixetSyncCtrl {
    /// Synchronisation capability over `camera`.
    pub fn new(camera: Arc<PixetCamera>) -> Self {
        Self {
            camera,
            state: Mutex::new(SyncState {
                latency_s: MIN_LATENCY_S,
                nb_frames: 1,
            }),
        }
    }

    /// Push the frame count to the camera ahead of a new session.
    ///
    /// Returns the exposure period (exposure + latency). The SDK call takes no
    /// period, so it is not applied.
    pub fn prepare_acq(&self) -> f64 {
        let state = self.state.lock();
        let acquisition = self.camera.acquisition();
        let period = acquisition.exposure() + state.latency_s;
        acquisition.set_nb_frames(state.nb_frames);
        debug!(
            frames = state.nb_frames,
            period_s = period,
            "Synchronisation prepared"
        );
        period
    }
}

impl SyncCtrl for PixetSyncCtrl {
    fn check_trig_mode(&self, mode: TrigMode) -> bool {
        TriggerMode::from_host(mode).is_some()
    }

    fn set_trig_mode(&self, mode: TrigMode) -> CameraResult<()> {
        let native = TriggerMode::from_host(mode).ok_or_else(|| {
            CameraError::NotSupported(format!("trigger mode {:?}", mode))
        })?;
        self.camera.acquisition().set_trigger_mode(native);
        Ok(())
    }

    fn trig_mode(&self) -> Option<TrigMode> {
        Some(self.camera.acquisition().trigger_mode().to_host())
    }

    fn set_exp_time(&self, exp_time: f64) -> CameraResult<()> {
        self.camera.acquisition().set_exposure(exp_time)
    }

    fn exp_time(&self) -> f64 {
        self.camera.acquisition().exposure()
    }

    fn set_lat_time(&self, lat_time: f64) -> CameraResult<()> {
        if !(VALID_RANGES.min_lat_time..=VALID_RANGES.max_lat_time).contains(&lat_time) {
            return Err(CameraError::validation(
                "latency_time",
                format!(
                    "{} s outside range = [{},{}] s",
                    lat_time, VALID_RANGES.min_lat_time, VALID_RANGES.max_lat_time
                ),
            ));
        }
        self.state.lock().latency_s = lat_time;
        Ok(())
    }

    fn lat_time(&self) -> f64 {
        self.state.lock().latency_s
    }

    fn set_nb_frames(&self, nb_frames: u64) {
        self.state.lock().nb_frames = nb_frames;
    }

    fn nb_frames(&self) -> u64 {
        self.state.lock().nb_frames
    }

    fn valid_ranges(&self) -> ValidRanges {
        VALID_RANGES
    }
}
