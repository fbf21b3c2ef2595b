//! Pixet SDK seam.
//!
//! The adapter never calls the vendor library directly. A native binding (or the
//! simulated SDK behind the `mock` feature) implements these traits.
//!
//! ## Threading
//!
//! - [`PixetDevice::do_advanced_acquisition`] blocks for the whole burst and is
//!   called from the adapter's worker thread.
//! - Frame callbacks run on SDK-owned threads. They may only fetch the last frame
//!   and hand it off; they must never block on adapter locks.
//! - [`PixetDevice::abort_operation`] may be called from any thread and makes the
//!   blocking call return.

use std::path::Path;
use std::sync::Arc;

use crate::error::SdkResult;
use crate::family::{AcqType, OperationMode, TriggerMode};

/// Callback invoked when a frame completes.
///
/// The argument is the cumulative number of frames acquired by the hardware in
/// the running burst (1 for the first frame).
pub type FrameCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Parameters of one blocking acquisition call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcquisitionRequest {
    /// Frames to acquire.
    pub frame_count: u64,
    /// Exposure per frame in seconds.
    pub exposure_s: f64,
    /// Readout type.
    pub acq_type: AcqType,
    /// Native trigger mode.
    pub trigger_mode: TriggerMode,
}

/// Entry point of the SDK.
pub trait PixetSdk: Send + Sync {
    /// Start the SDK core.
    fn start(&self) -> SdkResult<()>;

    /// Shut the SDK core down.
    fn exit(&self);

    /// Connected detectors, in enumeration order.
    fn devices(&self) -> Vec<Arc<dyn PixetDevice>>;
}

/// One connected detector.
pub trait PixetDevice: Send + Sync {
    /// Full product name, e.g. `"MiniPIX TPX3 J06-W0105"`.
    fn full_name(&self) -> String;
    /// Sensor width in pixels.
    fn width(&self) -> u32;
    /// Sensor height in pixels.
    fn height(&self) -> u32;
    /// Total pixel count.
    fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }
    /// Number of chips.
    fn chip_count(&self) -> usize;
    /// Chip identifiers, one per chip.
    fn chip_ids(&self) -> Vec<String>;

    /// Load a device configuration (factory XML).
    fn load_config_from_file(&self, path: &Path) -> SdkResult<()>;

    /// Energy threshold `index` of `chip`, in keV.
    fn threshold(&self, chip: usize, index: usize) -> SdkResult<f64>;
    /// Set energy threshold `index` of `chip`, in keV.
    fn set_threshold(&self, chip: usize, index: usize, kev: f64) -> SdkResult<()>;

    /// Bias voltage setpoint in volts.
    fn bias(&self) -> SdkResult<f64>;
    /// Set the bias voltage in volts.
    fn set_bias(&self, volts: f64) -> SdkResult<()>;
    /// Measured bias voltage in volts.
    fn bias_voltage_sense(&self) -> SdkResult<f64>;
    /// Measured bias current in microamps.
    fn bias_current_sense(&self) -> SdkResult<f64>;
    /// Detector temperature in degrees Celsius.
    fn temperature(&self) -> SdkResult<f64>;

    /// Current chip operation mode.
    fn operation_mode(&self) -> SdkResult<OperationMode>;
    /// Change the chip operation mode.
    fn set_operation_mode(&self, mode: OperationMode) -> SdkResult<()>;
    /// Counter depth setting (Medipix3).
    fn counter_depth(&self) -> SdkResult<u32>;
    /// Whether the sensor supports refresh.
    fn is_sensor_refresh_supported(&self) -> bool;

    /// Run a burst; blocks until every frame is acquired or the burst is aborted.
    fn do_advanced_acquisition(&self, request: &AcquisitionRequest) -> SdkResult<()>;
    /// Issue a software trigger.
    fn do_software_trigger(&self) -> SdkResult<()>;
    /// Abort the running acquisition.
    fn abort_operation(&self) -> SdkResult<()>;

    /// Register the frame-completed callback, replacing any previous one.
    fn register_frame_callback(&self, callback: FrameCallback) -> SdkResult<()>;
    /// Remove the frame-completed callback.
    fn unregister_frame_callback(&self) -> SdkResult<()>;

    /// Most recently completed frame. The handle is released when dropped.
    fn last_acq_frame(&self) -> SdkResult<Box<dyn AcquiredFrame>>;
}

/// Raw samples of a frame or sub-frame, in the SDK's native element type.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    /// Signed 16-bit samples.
    I16(Vec<i16>),
    /// Unsigned 16-bit samples.
    U16(Vec<u16>),
    /// Unsigned 32-bit samples.
    U32(Vec<u32>),
    /// Floating-point samples.
    F64(Vec<f64>),
}

impl FrameData {
    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            FrameData::I16(v) => v.len(),
            FrameData::U16(v) => v.len(),
            FrameData::U32(v) => v.len(),
            FrameData::F64(v) => v.len(),
        }
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reinterpret every sample as `i16` (wrapping for integers, saturating for floats).
    pub fn to_i16(&self) -> Vec<i16> {
        match self {
            FrameData::I16(v) => v.clone(),
            FrameData::U16(v) => v.iter().map(|&x| x as i16).collect(),
            FrameData::U32(v) => v.iter().map(|&x| x as i16).collect(),
            FrameData::F64(v) => v.iter().map(|&x| x as i16).collect(),
        }
    }
}

/// One channel of a multi-channel frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SubFrame {
    /// Channel name reported by the SDK (e.g. "iToT", "Event").
    pub name: String,
    /// Samples, row-major.
    pub data: FrameData,
}

/// Handle on a completed frame held by the SDK.
///
/// The SDK keeps a reference count on the frame while the handle is alive;
/// dropping the handle releases it.
pub trait AcquiredFrame: Send {
    /// Frame samples, row-major.
    fn data(&self) -> FrameData;
    /// Number of sub-frames.
    fn sub_frame_count(&self) -> usize;
    /// Sub-frame `index`, if present.
    fn sub_frame(&self, index: usize) -> Option<SubFrame>;
}
