//! Pixet Feature Control
//!
//! Typed accessors over detector settings. Every setter validates before
//! reaching the device, so a rejected value leaves the device untouched.

use std::sync::Arc;

use pixet_core::limits::validate_energy_threshold;
use pixet_core::{CameraError, CameraResult};
use tracing::{debug, info};

use crate::family::{OperationMode, SensorFamily};
use crate::sdk::PixetDevice;

/// Settings facade over one detector.
pub struct PixetFeatures {
    device: Arc<dyn PixetDevice>,
    family: SensorFamily,
    chip_count: usize,
}

impl PixetFeatures {
    /// Settings facade over `device`.
    pub fn new(device: Arc<dyn PixetDevice>, family: SensorFamily) -> Self {
        let chip_count = device.chip_count();
        Self {
            device,
            family,
            chip_count,
        }
    }

    /// Chip family the settings apply to.
    pub fn family(&self) -> SensorFamily {
        self.family
    }

    // =========================================================================
    // Energy thresholds
    // =========================================================================

    /// Threshold 0 of chip 0, in keV.
    pub fn energy_threshold0(&self) -> CameraResult<f64> {
        Ok(self.device.threshold(0, 0)?)
    }

    /// Set threshold 0 on every chip.
    pub fn set_energy_threshold0(&self, kev: f64) -> CameraResult<()> {
        let kev = validate_energy_threshold("energy_threshold", kev)?;
        self.set_threshold_all_chips(0, kev)
    }

    /// Threshold 1 of chip 0, in keV. `None` on single-threshold families.
    pub fn energy_threshold1(&self) -> CameraResult<Option<f64>> {
        if self.family.caps().threshold_count < 2 {
            return Ok(None);
        }
        Ok(Some(self.device.threshold(0, 1)?))
    }

    /// Set threshold 1 on every chip.
    pub fn set_energy_threshold1(&self, kev: f64) -> CameraResult<()> {
        if self.family.caps().threshold_count < 2 {
            return Err(CameraError::NotSupported(format!(
                "{} supports only one energy threshold",
                self.family
            )));
        }
        let kev = validate_energy_threshold("energy_threshold1", kev)?;
        self.set_threshold_all_chips(1, kev)
    }

    fn set_threshold_all_chips(&self, index: usize, kev: f64) -> CameraResult<()> {
        for chip in 0..self.chip_count {
            self.device.set_threshold(chip, index, kev)?;
        }
        info!(index, kev, chips = self.chip_count, "Energy threshold set");
        Ok(())
    }

    // =========================================================================
    // Bias, temperature
    // =========================================================================

    /// Bias voltage setpoint in volts.
    pub fn bias_voltage(&self) -> CameraResult<f64> {
        Ok(self.device.bias()?)
    }

    /// Set the bias voltage in volts.
    pub fn set_bias_voltage(&self, volts: f64) -> CameraResult<()> {
        self.device.set_bias(volts)?;
        debug!(volts, "Bias voltage set");
        Ok(())
    }

    /// Measured bias voltage in volts.
    pub fn sensed_bias_voltage(&self) -> CameraResult<f64> {
        Ok(self.device.bias_voltage_sense()?)
    }

    /// Measured bias current in microamperes.
    pub fn sensed_bias_current(&self) -> CameraResult<f64> {
        Ok(self.device.bias_current_sense()?)
    }

    /// Detector temperature in degrees Celsius.
    pub fn temperature(&self) -> CameraResult<f64> {
        Ok(self.device.temperature()?)
    }

    // =========================================================================
    // Operation mode
    // =========================================================================

    /// Current operation mode.
    pub fn operation_mode(&self) -> CameraResult<OperationMode> {
        Ok(self.device.operation_mode()?)
    }

    /// Apply a typed operation mode; it must belong to the detector's family.
    pub fn set_operation_mode(&self, mode: OperationMode) -> CameraResult<()> {
        if !self.family.supports(mode) {
            return Err(CameraError::validation(
                "operation_mode",
                format!(
                    "{} is not a {} mode (choices: {})",
                    mode,
                    self.family,
                    self.operation_mode_choices().join(", ")
                ),
            ));
        }
        self.device.set_operation_mode(mode)?;
        info!(mode = mode.as_str(), "Operation mode set");
        Ok(())
    }

    /// Apply an operation mode by name.
    pub fn set_operation_mode_by_name(&self, name: &str) -> CameraResult<()> {
        let mode = OperationMode::from_str(name).ok_or_else(|| {
            CameraError::validation(
                "operation_mode",
                format!(
                    "unknown mode '{}' (choices: {})",
                    name,
                    self.operation_mode_choices().join(", ")
                ),
            )
        })?;
        self.set_operation_mode(mode)
    }

    /// Names of the modes this family supports.
    pub fn operation_mode_choices(&self) -> Vec<String> {
        OperationMode::all_choices(self.family)
    }

    /// Pixel depth reported to the host.
    pub fn bit_depth(&self) -> CameraResult<u32> {
        self.family
            .bit_depth(|| self.device.counter_depth().map_err(CameraError::from))
    }
}
