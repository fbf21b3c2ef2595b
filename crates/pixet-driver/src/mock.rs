//! Simulated Pixet SDK.
//!
//! Behaves like a connected detector closely enough to exercise the whole
//! adapter: the blocking acquisition call produces frames at `frame_period`,
//! invokes the registered callback from the calling thread (or, with a
//! `callback_latency`, from a delayed thread of its own), waits for software
//! triggers in per-frame mode and honours aborts (optionally late, to exercise
//! the stop timeout). Faults and reported frame indices can be injected at
//! runtime.
//!
//! Frame contents are deterministic: see [`event_value`] and [`counter_value`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{SdkError, SdkResult};
use crate::family::{DeviceModel, OperationMode, SensorFamily, TriggerMode};
use crate::sdk::{
    AcquiredFrame, AcquisitionRequest, FrameCallback, FrameData, PixetDevice, PixetSdk, SubFrame,
};

/// Threshold every chip starts with, in keV.
pub const DEFAULT_THRESHOLD_KEV: f64 = 3.6;

fn default_full_name() -> String {
    "MiniPIX TPX3 J06-W0105".to_string()
}
fn default_width() -> u32 {
    256
}
fn default_height() -> u32 {
    256
}
fn default_chip_count() -> usize {
    1
}
fn default_counter_depth() -> u32 {
    2
}
fn default_frame_period() -> Duration {
    Duration::from_millis(10)
}
fn default_bias() -> f64 {
    50.0
}
fn default_temperature() -> f64 {
    38.5
}
fn default_connected() -> bool {
    true
}

/// Simulated detector description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockConfig {
    /// Device full name; its first word selects the model.
    #[serde(default = "default_full_name")]
    pub full_name: String,
    /// Sensor width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,
    /// Sensor height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,
    /// Number of chips.
    #[serde(default = "default_chip_count")]
    pub chip_count: usize,
    /// Medipix3 counter depth setting.
    #[serde(default = "default_counter_depth")]
    pub counter_depth: u32,
    /// Time to produce one frame (exposure is not simulated).
    #[serde(default = "default_frame_period", with = "humantime_serde")]
    pub frame_period: Duration,
    /// Delay before an abort takes effect.
    #[serde(default, with = "humantime_serde")]
    pub abort_latency: Duration,
    /// When non-zero, each frame callback runs on its own thread after this
    /// delay, possibly after the acquisition call has returned.
    #[serde(default, with = "humantime_serde")]
    pub callback_latency: Duration,
    /// Bias voltage at power-on.
    #[serde(default = "default_bias")]
    pub bias_voltage: f64,
    /// Reported temperature in degrees Celsius.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Whether a detector is enumerated at all.
    #[serde(default = "default_connected")]
    pub connected: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            full_name: default_full_name(),
            width: default_width(),
            height: default_height(),
            chip_count: default_chip_count(),
            counter_depth: default_counter_depth(),
            frame_period: default_frame_period(),
            abort_latency: Duration::ZERO,
            callback_latency: Duration::ZERO,
            bias_voltage: default_bias(),
            temperature: default_temperature(),
            connected: default_connected(),
        }
    }
}

impl MockConfig {
    /// Single-chip Timepix3 MiniPIX.
    pub fn minipix() -> Self {
        Self::default()
    }

    /// Two-row, five-chip Medipix3 WidePIX.
    pub fn widepix() -> Self {
        Self {
            full_name: "WidePIX 2x5 MPX3 W0029".to_string(),
            width: 1280,
            height: 512,
            chip_count: 10,
            ..Self::default()
        }
    }
}

/// Faults to inject into the simulated device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockFaults {
    /// The blocking acquisition call fails immediately.
    pub fail_acquisition: bool,
    /// Software triggers are refused.
    pub fail_trigger: bool,
    /// The blocking acquisition call panics.
    pub panic_in_acquisition: bool,
}

/// Event-channel value of `pixel` in frame `hw_index` (1-based).
pub fn event_value(hw_index: u64, pixel: usize) -> i16 {
    ((hw_index + pixel as u64) % 16) as i16
}

/// Counter value of `pixel` in frame `hw_index` (1-based).
pub fn counter_value(hw_index: u64, pixel: usize) -> u32 {
    ((hw_index * 7 + pixel as u64) % 4096) as u32
}

fn itot_value(hw_index: u64, pixel: usize) -> u32 {
    ((hw_index * 13 + pixel as u64) % 1024) as u32
}

#[derive(Debug)]
struct FrameContents {
    data: FrameData,
    sub_frames: Vec<SubFrame>,
}

struct MockDeviceState {
    thresholds: Vec<[f64; 2]>,
    bias: f64,
    operation_mode: OperationMode,
    loaded_config: Option<PathBuf>,
    callback: Option<FrameCallback>,
    pending_triggers: u64,
    triggers_issued: u64,
    abort_at: Option<Instant>,
    running: bool,
    acquisitions: u64,
    in_flight: u32,
    peak_in_flight: u32,
    frame_indices: Option<Vec<u64>>,
    last_frame: Option<Arc<FrameContents>>,
    faults: MockFaults,
}

/// Simulated detector.
pub struct MockDevice {
    config: MockConfig,
    family: SensorFamily,
    state: Mutex<MockDeviceState>,
    wake: Condvar,
    outstanding: Arc<AtomicUsize>,
}

impl MockDevice {
    /// Simulated detector described by `config`.
    pub fn new(config: MockConfig) -> Self {
        let family = DeviceModel::from_full_name(&config.full_name)
            .map(DeviceModel::family)
            .unwrap_or(SensorFamily::Timepix3);
        // Power-on mode differs from the bring-up default so bring-up is observable.
        let operation_mode = match family {
            SensorFamily::Timepix3 => OperationMode::ToaTot,
            SensorFamily::Medipix3 => OperationMode::Csm,
        };
        let state = MockDeviceState {
            thresholds: vec![[DEFAULT_THRESHOLD_KEV; 2]; config.chip_count],
            bias: config.bias_voltage,
            operation_mode,
            loaded_config: None,
            callback: None,
            pending_triggers: 0,
            triggers_issued: 0,
            abort_at: None,
            running: false,
            acquisitions: 0,
            in_flight: 0,
            peak_in_flight: 0,
            frame_indices: None,
            last_frame: None,
            faults: MockFaults::default(),
        };
        Self {
            config,
            family,
            state: Mutex::new(state),
            wake: Condvar::new(),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    // =========================================================================
    // Test hooks
    // =========================================================================

    /// Replace the injected faults.
    pub fn set_faults(&self, faults: MockFaults) {
        self.state.lock().faults = faults;
    }

    /// Report these hardware frame indices instead of 1..=N. Frames past the
    /// end of the list fall back to their position.
    pub fn set_frame_indices(&self, indices: Vec<u64>) {
        self.state.lock().frame_indices = Some(indices);
    }

    /// Largest number of blocking acquisition calls seen inside the SDK at once.
    pub fn peak_concurrent_acquisitions(&self) -> u32 {
        self.state.lock().peak_in_flight
    }

    /// Frame handles handed out and not yet dropped.
    pub fn outstanding_frames(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Whether a frame callback is registered.
    pub fn has_callback(&self) -> bool {
        self.state.lock().callback.is_some()
    }

    /// Configuration file loaded last.
    pub fn loaded_config(&self) -> Option<PathBuf> {
        self.state.lock().loaded_config.clone()
    }

    /// Software triggers received.
    pub fn triggers_issued(&self) -> u64 {
        self.state.lock().triggers_issued
    }

    /// Number of blocking acquisition calls entered.
    pub fn acquisitions(&self) -> u64 {
        self.state.lock().acquisitions
    }

    /// Whether an acquisition call is producing frames.
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Threshold as stored on the device.
    pub fn raw_threshold(&self, chip: usize, index: usize) -> Option<f64> {
        self.state
            .lock()
            .thresholds
            .get(chip)
            .and_then(|t| t.get(index).copied())
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    fn aborted(state: &MockDeviceState, now: Instant) -> bool {
        state.abort_at.is_some_and(|at| now >= at)
    }

    /// Block until `deadline` (or a trigger, when `want_trigger`), or an abort.
    fn wait(
        &self,
        state: &mut MutexGuard<'_, MockDeviceState>,
        deadline: Option<Instant>,
        want_trigger: bool,
    ) -> SdkResult<()> {
        loop {
            let now = Instant::now();
            if Self::aborted(state, now) {
                return Err(SdkError::Aborted);
            }
            if want_trigger && state.pending_triggers > 0 {
                state.pending_triggers -= 1;
                return Ok(());
            }
            if !want_trigger && deadline.is_some_and(|d| now >= d) {
                return Ok(());
            }

            let mut wake_at = deadline;
            if let Some(at) = state.abort_at {
                wake_at = Some(wake_at.map_or(at, |d| d.min(at)));
            }
            match wake_at {
                Some(at) => {
                    self.wake.wait_until(state, at);
                }
                None => self.wake.wait(state),
            }
        }
    }

    fn build_frame(&self, hw_index: u64) -> FrameContents {
        let pixels = self.config.width as usize * self.config.height as usize;
        match self.family {
            SensorFamily::Timepix3 => {
                let itot: Vec<u32> = (0..pixels).map(|p| itot_value(hw_index, p)).collect();
                let events: Vec<i16> = (0..pixels).map(|p| event_value(hw_index, p)).collect();
                FrameContents {
                    data: FrameData::U32(itot.clone()),
                    sub_frames: vec![
                        SubFrame {
                            name: "iToT".to_string(),
                            data: FrameData::U32(itot),
                        },
                        SubFrame {
                            name: "Event".to_string(),
                            data: FrameData::I16(events),
                        },
                    ],
                }
            }
            SensorFamily::Medipix3 => FrameContents {
                data: FrameData::U32((0..pixels).map(|p| counter_value(hw_index, p)).collect()),
                sub_frames: Vec::new(),
            },
        }
    }

    fn dispatch(&self, callback: FrameCallback, hw_index: u64) {
        let latency = self.config.callback_latency;
        if latency.is_zero() {
            callback(hw_index);
            return;
        }
        let spawned = thread::Builder::new()
            .name("mock-pixet-callback".into())
            .spawn(move || {
                thread::sleep(latency);
                callback(hw_index);
            });
        if let Err(e) = spawned {
            warn!(error = %e, hw_index, "Failed to spawn callback thread");
        }
    }

    fn check_chip(&self, chip: usize, index: usize) -> SdkResult<()> {
        if chip >= self.config.chip_count {
            return Err(SdkError::Parameter {
                name: "threshold".into(),
                message: format!("chip {} of {}", chip, self.config.chip_count),
            });
        }
        if index >= self.family.caps().threshold_count {
            return Err(SdkError::Parameter {
                name: "threshold".into(),
                message: format!("{} has no threshold {}", self.family, index),
            });
        }
        Ok(())
    }
}

impl PixetDevice for MockDevice {
    fn full_name(&self) -> String {
        self.config.full_name.clone()
    }

    fn width(&self) -> u32 {
        self.config.width
    }

    fn height(&self) -> u32 {
        self.config.height
    }

    fn chip_count(&self) -> usize {
        self.config.chip_count
    }

    fn chip_ids(&self) -> Vec<String> {
        (0..self.config.chip_count)
            .map(|i| format!("W0105_{}{:02}", (b'A' + (i % 26) as u8) as char, i + 1))
            .collect()
    }

    fn load_config_from_file(&self, path: &Path) -> SdkResult<()> {
        if !path.exists() {
            return Err(SdkError::ConfigLoad {
                path: path.to_path_buf(),
                message: "file not found".into(),
            });
        }
        self.state.lock().loaded_config = Some(path.to_path_buf());
        Ok(())
    }

    fn threshold(&self, chip: usize, index: usize) -> SdkResult<f64> {
        self.check_chip(chip, index)?;
        Ok(self.state.lock().thresholds[chip][index])
    }

    fn set_threshold(&self, chip: usize, index: usize, kev: f64) -> SdkResult<()> {
        self.check_chip(chip, index)?;
        self.state.lock().thresholds[chip][index] = kev;
        Ok(())
    }

    fn bias(&self) -> SdkResult<f64> {
        Ok(self.state.lock().bias)
    }

    fn set_bias(&self, volts: f64) -> SdkResult<()> {
        self.state.lock().bias = volts;
        Ok(())
    }

    fn bias_voltage_sense(&self) -> SdkResult<f64> {
        Ok(self.state.lock().bias * 0.98)
    }

    fn bias_current_sense(&self) -> SdkResult<f64> {
        Ok(0.5)
    }

    fn temperature(&self) -> SdkResult<f64> {
        Ok(self.config.temperature)
    }

    fn operation_mode(&self) -> SdkResult<OperationMode> {
        Ok(self.state.lock().operation_mode)
    }

    fn set_operation_mode(&self, mode: OperationMode) -> SdkResult<()> {
        if mode.family() != self.family {
            return Err(SdkError::Parameter {
                name: "operation mode".into(),
                message: format!("{} is not a {} mode", mode, self.family),
            });
        }
        self.state.lock().operation_mode = mode;
        Ok(())
    }

    fn counter_depth(&self) -> SdkResult<u32> {
        Ok(self.config.counter_depth)
    }

    fn is_sensor_refresh_supported(&self) -> bool {
        self.family == SensorFamily::Timepix3
    }

    #[allow(clippy::panic)]
    fn do_advanced_acquisition(&self, request: &AcquisitionRequest) -> SdkResult<()> {
        let mut state = self.state.lock();
        if state.faults.panic_in_acquisition {
            drop(state);
            panic!("simulated SDK crash");
        }
        if state.faults.fail_acquisition {
            return Err(SdkError::Acquisition {
                code: -1003,
                message: "simulated acquisition failure".into(),
            });
        }
        state.running = true;
        state.acquisitions += 1;
        state.in_flight += 1;
        state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
        debug!(
            frames = request.frame_count,
            trigger = request.trigger_mode.as_str(),
            "Mock acquisition started"
        );

        let mut result = Ok(());
        for hw_index in 1..=request.frame_count {
            if request.trigger_mode == TriggerMode::SoftwareStart {
                if let Err(e) = self.wait(&mut state, None, true) {
                    result = Err(e);
                    break;
                }
            }
            let deadline = Instant::now() + self.config.frame_period;
            if let Err(e) = self.wait(&mut state, Some(deadline), false) {
                result = Err(e);
                break;
            }

            let reported = state
                .frame_indices
                .as_ref()
                .and_then(|indices| indices.get(hw_index as usize - 1).copied())
                .unwrap_or(hw_index);
            state.last_frame = Some(Arc::new(self.build_frame(reported)));
            let callback = state.callback.clone();
            // Callbacks run without the device lock, as on the real SDK.
            drop(state);
            if let Some(callback) = callback {
                trace!(hw_index = reported, "Mock frame completed");
                self.dispatch(callback, reported);
            }
            state = self.state.lock();
        }

        state.running = false;
        state.in_flight -= 1;
        debug!(ok = result.is_ok(), "Mock acquisition returned");
        result
    }

    fn do_software_trigger(&self) -> SdkResult<()> {
        let mut state = self.state.lock();
        if state.faults.fail_trigger {
            return Err(SdkError::Trigger {
                message: "simulated trigger failure".into(),
            });
        }
        state.pending_triggers += 1;
        state.triggers_issued += 1;
        self.wake.notify_all();
        Ok(())
    }

    fn abort_operation(&self) -> SdkResult<()> {
        let mut state = self.state.lock();
        state.abort_at = Some(Instant::now() + self.config.abort_latency);
        self.wake.notify_all();
        Ok(())
    }

    fn register_frame_callback(&self, callback: FrameCallback) -> SdkResult<()> {
        let mut state = self.state.lock();
        state.callback = Some(callback);
        state.abort_at = None;
        state.pending_triggers = 0;
        Ok(())
    }

    fn unregister_frame_callback(&self) -> SdkResult<()> {
        self.state.lock().callback = None;
        Ok(())
    }

    fn last_acq_frame(&self) -> SdkResult<Box<dyn AcquiredFrame>> {
        let contents = self
            .state
            .lock()
            .last_frame
            .clone()
            .ok_or_else(|| SdkError::FrameUnavailable {
                message: "no frame acquired yet".into(),
            })?;
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockFrame {
            contents,
            outstanding: Arc::clone(&self.outstanding),
        }))
    }
}

/// Frame handle; decrements the device's outstanding count on drop.
struct MockFrame {
    contents: Arc<FrameContents>,
    outstanding: Arc<AtomicUsize>,
}

impl AcquiredFrame for MockFrame {
    fn data(&self) -> FrameData {
        self.contents.data.clone()
    }

    fn sub_frame_count(&self) -> usize {
        self.contents.sub_frames.len()
    }

    fn sub_frame(&self, index: usize) -> Option<SubFrame> {
        self.contents.sub_frames.get(index).cloned()
    }
}

impl Drop for MockFrame {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Simulated SDK with at most one detector.
pub struct MockPixet {
    device: Arc<MockDevice>,
    connected: bool,
    started: AtomicBool,
    exit_count: AtomicUsize,
}

impl MockPixet {
    /// Simulated SDK with one detector described by `config`.
    pub fn new(config: MockConfig) -> Self {
        Self {
            connected: config.connected,
            device: Arc::new(MockDevice::new(config)),
            started: AtomicBool::new(false),
            exit_count: AtomicUsize::new(0),
        }
    }

    /// The simulated detector, for test hooks.
    pub fn device(&self) -> Arc<MockDevice> {
        Arc::clone(&self.device)
    }

    /// Whether `start` ran without a later `exit`.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Number of `exit` calls.
    pub fn exit_count(&self) -> usize {
        self.exit_count.load(Ordering::SeqCst)
    }
}

impl PixetSdk for MockPixet {
    fn start(&self) -> SdkResult<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn exit(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.exit_count.fetch_add(1, Ordering::SeqCst);
    }

    fn devices(&self) -> Vec<Arc<dyn PixetDevice>> {
        if self.connected {
            vec![self.device.clone() as Arc<dyn PixetDevice>]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::AcqType;
    use std::sync::atomic::AtomicU64;

    fn fast_config() -> MockConfig {
        MockConfig {
            width: 4,
            height: 2,
            frame_period: Duration::from_millis(1),
            ..MockConfig::minipix()
        }
    }

    fn request(frames: u64, trigger_mode: TriggerMode) -> AcquisitionRequest {
        AcquisitionRequest {
            frame_count: frames,
            exposure_s: 0.001,
            acq_type: AcqType::Frames,
            trigger_mode,
        }
    }

    #[test]
    fn test_burst_invokes_callback_per_frame() {
        let device = MockDevice::new(fast_config());
        let seen = Arc::new(AtomicU64::new(0));
        let seen_cb = seen.clone();
        device
            .register_frame_callback(Arc::new(move |n| seen_cb.store(n, Ordering::SeqCst)))
            .unwrap();

        device
            .do_advanced_acquisition(&request(3, TriggerMode::Normal))
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        let frame = device.last_acq_frame().unwrap();
        assert_eq!(device.outstanding_frames(), 1);
        let events = frame.sub_frame(1).unwrap();
        assert_eq!(events.name, "Event");
        assert_eq!(events.data, FrameData::I16((0..8).map(|p| event_value(3, p)).collect()));
        drop(frame);
        assert_eq!(device.outstanding_frames(), 0);
    }

    #[test]
    fn test_abort_releases_trigger_wait() {
        let device = Arc::new(MockDevice::new(fast_config()));
        let worker = {
            let device = device.clone();
            thread::spawn(move || device.do_advanced_acquisition(&request(5, TriggerMode::SoftwareStart)))
        };
        while !device.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        device.abort_operation().unwrap();
        let result = worker.join().unwrap();
        assert!(matches!(result, Err(SdkError::Aborted)));
        assert!(!device.is_running());
    }

    #[test]
    fn test_reported_indices_and_late_callbacks() {
        let device = MockDevice::new(MockConfig {
            callback_latency: Duration::from_millis(20),
            ..fast_config()
        });
        device.set_frame_indices(vec![1, 3, 3]);
        let (tx, rx) = std::sync::mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        device
            .register_frame_callback(Arc::new(move |n| {
                let _ = tx.lock().send(n);
            }))
            .unwrap();

        device
            .do_advanced_acquisition(&request(3, TriggerMode::Normal))
            .unwrap();
        // The call returned before any delayed callback ran.
        assert!(rx.try_recv().is_err());
        device.unregister_frame_callback().unwrap();

        let mut seen: Vec<u64> = rx.iter().collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 3, 3]);
        assert_eq!(device.peak_concurrent_acquisitions(), 1);
    }

    #[test]
    fn test_thresholds_per_family() {
        let tpx = MockDevice::new(fast_config());
        assert_eq!(tpx.threshold(0, 0).unwrap(), DEFAULT_THRESHOLD_KEV);
        assert!(tpx.threshold(0, 1).is_err());
        assert!(tpx.threshold(1, 0).is_err());

        let mpx = MockDevice::new(MockConfig::widepix());
        mpx.set_threshold(9, 1, 20.0).unwrap();
        assert_eq!(mpx.raw_threshold(9, 1), Some(20.0));
    }

    #[test]
    fn test_operation_mode_family_checked() {
        let device = MockDevice::new(fast_config());
        assert!(device.set_operation_mode(OperationMode::Csm).is_err());
        device.set_operation_mode(OperationMode::Toa).unwrap();
        assert_eq!(device.operation_mode().unwrap(), OperationMode::Toa);
    }

    #[test]
    fn test_sdk_lifecycle() {
        let sdk = MockPixet::new(MockConfig {
            connected: false,
            ..MockConfig::default()
        });
        sdk.start().unwrap();
        assert!(sdk.is_started());
        assert!(sdk.devices().is_empty());
        sdk.exit();
        assert_eq!(sdk.exit_count(), 1);
    }
}
