//! Detector information capability.

use std::sync::Arc;

use pixet_core::limits::PIXEL_SIZE_M;
use pixet_core::{
    CameraError, CameraResult, DetInfoCtrl, ImageType, MaxImageSizeCallback, Size,
};
use tracing::debug;

use crate::camera::PixetCamera;

/// Reports the fixed geometry and pixel depth of a [`PixetCamera`].
pub struct PixetDetInfo {
    camera: Arc<PixetCamera>,
}

impl PixetDetInfo {
    /// Detector-info capability over `camera`.
    pub fn new(camera: Arc<PixetCamera>) -> Self {
        Self { camera }
    }
}

impl DetInfoCtrl for PixetDetInfo {
    fn max_image_size(&self) -> Size {
        self.camera.size()
    }

    fn def_image_type(&self) -> CameraResult<ImageType> {
        Ok(self.camera.image_type())
    }

    fn set_curr_image_type(&self, image_type: ImageType) -> CameraResult<()> {
        if image_type == self.camera.image_type() {
            return Ok(());
        }
        Err(CameraError::NotSupported(format!(
            "image type is fixed at {} bits",
            self.camera.image_type().bits()
        )))
    }

    fn pixel_size(&self) -> (f64, f64) {
        (PIXEL_SIZE_M, PIXEL_SIZE_M)
    }

    fn detector_type(&self) -> String {
        self.camera.family().caps().detector_type.to_string()
    }

    fn detector_model(&self) -> String {
        self.camera.detector_model()
    }

    // Geometry never changes, so size callbacks are never invoked.
    fn register_max_image_size_callback(&self, _callback: MaxImageSizeCallback) {
        debug!("max image size callback registered (never fires)");
    }

    fn unregister_max_image_size_callback(&self, _callback: &MaxImageSizeCallback) {}
}
