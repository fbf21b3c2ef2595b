//! Pixet camera: connection, settings and acquisition bundled per detector.

use std::path::Path;
use std::sync::Arc;

use pixet_core::{CameraResult, FrameDim, ImageType, Size};
use tracing::{info, warn};

use crate::components::acquisition::{CameraStatus, PixetAcquisition};
use crate::components::connection::PixetConnection;
use crate::components::features::PixetFeatures;
use crate::config::DetectorConfig;
use crate::family::{DeviceModel, SensorFamily};
use crate::sdk::PixetSdk;

/// One opened detector.
///
/// Geometry and pixel depth are read once at bring-up and stay fixed for the
/// lifetime of the camera.
pub struct PixetCamera {
    // Field order is drop order: stop acquisition before the SDK exits.
    acquisition: PixetAcquisition,
    features: PixetFeatures,
    connection: PixetConnection,
    size: Size,
    image_type: ImageType,
    full_name: String,
    chip_ids: Vec<String>,
}

impl PixetCamera {
    /// Bring the first connected detector up.
    ///
    /// Applies the configured (or family default) operation mode and energy
    /// threshold, then logs the detector state.
    pub fn open(sdk: Arc<dyn PixetSdk>, config: &DetectorConfig) -> CameraResult<Self> {
        let connection = PixetConnection::open(sdk, config)?;
        let family = connection.family();
        let device = Arc::clone(connection.device());
        let features = PixetFeatures::new(Arc::clone(&device), family);

        match &config.operation_mode {
            Some(name) => features.set_operation_mode_by_name(name)?,
            None => features.set_operation_mode(family.caps().default_operation_mode)?,
        }
        if let Some(kev) = config.energy_threshold {
            features.set_energy_threshold0(kev)?;
        }

        let image_type = ImageType::from_bpp(features.bit_depth()?)?;
        let size = Size::new(device.width(), device.height());
        let acquisition = PixetAcquisition::new(
            device.clone(),
            family.caps(),
            (size.height as usize, size.width as usize),
            config.stop_timeout,
            config.start_settle,
        );

        let camera = Self {
            acquisition,
            features,
            full_name: device.full_name(),
            chip_ids: device.chip_ids(),
            connection,
            size,
            image_type,
        };
        camera.log_detector_info();
        Ok(camera)
    }

    fn log_detector_info(&self) {
        let device = self.connection.device();
        info!(
            model = self.model().as_str(),
            name = %self.full_name,
            size = %self.size,
            pixels = device.pixel_count(),
            chips = device.chip_count(),
            chip_ids = ?self.chip_ids,
            bpp = self.image_type.bits(),
            "Detector info"
        );

        match (
            self.features.energy_threshold0(),
            self.features.energy_threshold1(),
        ) {
            (Ok(thl0), Ok(Some(thl1))) => info!(thl0, thl1, "Energy thresholds (keV)"),
            (Ok(thl0), Ok(None)) => info!(thl0, "Energy threshold (keV)"),
            (Err(e), _) | (_, Err(e)) => warn!(error = %e, "Could not read energy thresholds"),
        }

        let bias = self.features.bias_voltage().ok();
        let sensed_v = self.features.sensed_bias_voltage().ok();
        let sensed_ua = self.features.sensed_bias_current().ok();
        info!(
            bias_v = ?bias,
            sensed_v = ?sensed_v,
            sensed_ua = ?sensed_ua,
            refresh_supported = device.is_sensor_refresh_supported(),
            "Bias"
        );

        let mode = self
            .features
            .operation_mode()
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|e| format!("unknown ({})", e));
        let temperature = self.features.temperature().ok();
        info!(mode = %mode, temperature_c = ?temperature, "Operating state");
    }

    /// Detector settings.
    pub fn features(&self) -> &PixetFeatures {
        &self.features
    }

    /// Acquisition state machine.
    pub fn acquisition(&self) -> &PixetAcquisition {
        &self.acquisition
    }

    /// Product line detected at bring-up.
    pub fn model(&self) -> DeviceModel {
        self.connection.model()
    }

    /// Chip family of the detector.
    pub fn family(&self) -> SensorFamily {
        self.connection.family()
    }

    /// Full detector geometry.
    pub fn size(&self) -> Size {
        self.size
    }

    /// Pixel depth delivered to the host.
    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    /// Device configuration file loaded at bring-up.
    pub fn config_file(&self) -> &Path {
        self.connection.config_file()
    }

    /// Device full name as reported by the SDK.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Identifier of the first chip.
    pub fn chip_id(&self) -> &str {
        self.chip_ids.first().map(String::as_str).unwrap_or("")
    }

    /// Identifiers of every chip.
    pub fn chip_ids(&self) -> &[String] {
        &self.chip_ids
    }

    /// `"<full name> - <chip id>"`.
    pub fn detector_model(&self) -> String {
        format!("{} - {}", self.full_name, self.chip_id())
    }

    /// Frame geometry a host buffer must be allocated with.
    pub fn frame_dim(&self) -> FrameDim {
        FrameDim {
            width: self.size.width as usize,
            height: self.size.height as usize,
            image_type: self.image_type,
        }
    }

    /// Current acquisition status.
    pub fn status(&self) -> CameraStatus {
        self.acquisition.status()
    }

    /// Abort any acquisition and clear a latched fault.
    pub fn hard_reset(&self) -> CameraResult<()> {
        self.acquisition.hard_reset()
    }

    /// Stop acquiring and shut the SDK down. Also done on drop.
    pub fn quit(&self) {
        if self.acquisition.has_session() {
            if let Err(e) = self.acquisition.stop_acq() {
                warn!(error = %e, "Stop during quit failed");
            }
        }
        self.connection.shutdown();
    }

    /// Whether the SDK has been shut down.
    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }
}
