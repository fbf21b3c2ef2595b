//! Host hardware-interface contract.
//!
//! A host acquisition framework drives a camera through three capability objects
//! (detector information, synchronisation, buffer) plus the top-level
//! [`HwInterface`] lifecycle calls. Camera adapters implement these traits; the
//! host never sees the detector SDK.
//!
//! # Status model
//!
//! [`HwStatus`] carries two axes. The detector axis is a bit mask ([`DetStatus`])
//! restricted by `det_mask` to the bits the camera actually reports; the
//! acquisition axis is a plain enum ([`AcqStatus`]).

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::buffer::BufferManager;
use crate::error::{CameraError, CameraResult};

/// Image geometry in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Create a new size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel depth advertised to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageType {
    /// 12 bits per pixel.
    Bpp12,
    /// 16 bits per pixel.
    Bpp16,
    /// 24 bits per pixel.
    Bpp24,
}

impl ImageType {
    /// Map a bit depth onto a host image type.
    pub fn from_bpp(bpp: u32) -> CameraResult<Self> {
        match bpp {
            12 => Ok(ImageType::Bpp12),
            16 => Ok(ImageType::Bpp16),
            24 => Ok(ImageType::Bpp24),
            other => Err(CameraError::NotSupported(format!(
                "no host image type for {} bits per pixel",
                other
            ))),
        }
    }

    /// Bits per pixel.
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            ImageType::Bpp12 => 12,
            ImageType::Bpp16 => 16,
            ImageType::Bpp24 => 24,
        }
    }
}

/// Host trigger vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrigMode {
    /// One internal trigger starts the whole sequence.
    IntTrig,
    /// One internal trigger per frame, issued by each start call.
    IntTrigMult,
    /// One external trigger starts the whole sequence.
    ExtTrigSingle,
    /// One external trigger per frame.
    ExtTrigMult,
    /// External gate controls exposure.
    ExtGate,
    /// External start/stop pulses.
    ExtStartStop,
    /// External trigger starts readout.
    ExtTrigReadout,
}

impl TrigMode {
    /// Every mode in the host vocabulary.
    pub const ALL: [TrigMode; 7] = [
        TrigMode::IntTrig,
        TrigMode::IntTrigMult,
        TrigMode::ExtTrigSingle,
        TrigMode::ExtTrigMult,
        TrigMode::ExtGate,
        TrigMode::ExtStartStop,
        TrigMode::ExtTrigReadout,
    ];
}

/// Synchronisation bounds reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidRanges {
    /// Shortest exposure in seconds.
    pub min_exp_time: f64,
    /// Longest exposure in seconds.
    pub max_exp_time: f64,
    /// Shortest latency in seconds.
    pub min_lat_time: f64,
    /// Longest latency in seconds.
    pub max_lat_time: f64,
}

/// Reset depth requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetLevel {
    /// Reset adapter state only.
    SoftReset,
    /// Reset the detector.
    HardReset,
}

bitflags! {
    /// Detector-axis status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DetStatus: u32 {
        /// Detector fault.
        const FAULT = 0x01;
        /// Waiting for a trigger.
        const WAIT_FOR_TRIGGER = 0x02;
        /// Shutter open.
        const SHUTTER_OPEN = 0x04;
        /// Exposure in progress.
        const EXPOSURE = 0x08;
        /// Shutter closing.
        const SHUTTER_CLOSE = 0x10;
        /// Charge shift.
        const CHARGE_SHIFT = 0x20;
        /// Readout in progress.
        const READOUT = 0x40;
        /// Latency period.
        const LATENCY = 0x80;
    }
}

impl DetStatus {
    /// Detector idle (no bit set).
    pub const IDLE: DetStatus = DetStatus::empty();
}

/// Acquisition-axis status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcqStatus {
    /// Ready to accept a start.
    Ready,
    /// Acquisition in progress.
    Running,
    /// Acquisition failed.
    Fault,
    /// Being configured.
    Config,
}

/// Status snapshot returned to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwStatus {
    /// Detector axis.
    pub det: DetStatus,
    /// Acquisition axis.
    pub acq: AcqStatus,
    /// Detector bits this camera reports.
    pub det_mask: DetStatus,
}

/// Callback invoked when the maximum image size changes.
pub type MaxImageSizeCallback = Arc<dyn Fn(Size, ImageType) + Send + Sync>;

/// Detector information capability.
pub trait DetInfoCtrl: Send + Sync {
    /// Largest image the detector can produce.
    fn max_image_size(&self) -> Size;

    /// Current detector image size.
    fn detector_image_size(&self) -> Size {
        self.max_image_size()
    }

    /// Default pixel depth.
    fn def_image_type(&self) -> CameraResult<ImageType>;

    /// Current pixel depth.
    fn curr_image_type(&self) -> CameraResult<ImageType> {
        self.def_image_type()
    }

    /// Change the pixel depth.
    fn set_curr_image_type(&self, image_type: ImageType) -> CameraResult<()>;

    /// Pixel pitch in metres (x, y).
    fn pixel_size(&self) -> (f64, f64);

    /// Detector family name.
    fn detector_type(&self) -> String;

    /// Detector model description.
    fn detector_model(&self) -> String;

    /// Register for maximum image size changes.
    fn register_max_image_size_callback(&self, callback: MaxImageSizeCallback);

    /// Remove a previously registered callback.
    fn unregister_max_image_size_callback(&self, callback: &MaxImageSizeCallback);
}

/// Synchronisation capability.
pub trait SyncCtrl: Send + Sync {
    /// True if the trigger mode can be applied.
    fn check_trig_mode(&self, mode: TrigMode) -> bool;

    /// Apply a trigger mode.
    fn set_trig_mode(&self, mode: TrigMode) -> CameraResult<()>;

    /// Current trigger mode, if it maps onto the host vocabulary.
    fn trig_mode(&self) -> Option<TrigMode>;

    /// Exposure time in seconds.
    fn set_exp_time(&self, exp_time: f64) -> CameraResult<()>;

    /// Exposure time in seconds.
    fn exp_time(&self) -> f64;

    /// Latency time in seconds.
    fn set_lat_time(&self, lat_time: f64) -> CameraResult<()>;

    /// Latency time in seconds.
    fn lat_time(&self) -> f64;

    /// Requested frame count.
    fn set_nb_frames(&self, nb_frames: u64);

    /// Requested frame count.
    fn nb_frames(&self) -> u64;

    /// Requested hardware frame count.
    fn set_nb_hw_frames(&self, nb_frames: u64) {
        self.set_nb_frames(nb_frames);
    }

    /// Requested hardware frame count.
    fn nb_hw_frames(&self) -> u64 {
        self.nb_frames()
    }

    /// Bounds for exposure and latency.
    fn valid_ranges(&self) -> ValidRanges;
}

/// One entry of the capability list.
#[derive(Clone)]
pub enum HwCap {
    /// Detector information.
    DetInfo(Arc<dyn DetInfoCtrl>),
    /// Synchronisation.
    Sync(Arc<dyn SyncCtrl>),
    /// Frame buffer.
    Buffer(Arc<dyn BufferManager>),
}

impl HwCap {
    /// Short capability name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            HwCap::DetInfo(_) => "DetInfo",
            HwCap::Sync(_) => "Sync",
            HwCap::Buffer(_) => "Buffer",
        }
    }
}

impl fmt::Debug for HwCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HwCap").field(&self.name()).finish()
    }
}

/// Top-level hardware interface implemented by a camera adapter.
pub trait HwInterface: Send + Sync {
    /// Capabilities offered to the host.
    fn cap_list(&self) -> Vec<HwCap>;

    /// Reset the camera.
    fn reset(&self, level: ResetLevel) -> CameraResult<()>;

    /// Prepare a new acquisition session.
    fn prepare_acq(&self) -> CameraResult<()>;

    /// Start (or re-trigger) the acquisition.
    fn start_acq(&self) -> CameraResult<()>;

    /// Stop the acquisition.
    fn stop_acq(&self) -> CameraResult<()>;

    /// Current status; never blocks on hardware.
    fn status(&self) -> HwStatus;

    /// Frames acquired in the current session.
    fn nb_acquired_frames(&self) -> u64;

    /// Frames acquired by the hardware in the current session.
    fn nb_hw_acquired_frames(&self) -> u64 {
        self.nb_acquired_frames()
    }
}
