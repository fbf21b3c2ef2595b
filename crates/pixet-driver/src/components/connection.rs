//! Pixet Connection Management
//!
//! Handles factory configuration discovery, SDK start-up, detector selection and
//! SDK shutdown.
//!
//! ## Shutdown
//!
//! The SDK core is process-global. It is shut down exactly once: by an explicit
//! [`PixetConnection::shutdown`] or when the connection is dropped. A failed
//! bring-up shuts it down before returning the error.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pixet_core::{CameraError, CameraResult};
use tracing::{debug, info};

use crate::config::DetectorConfig;
use crate::family::{DeviceModel, SensorFamily};
use crate::sdk::{PixetDevice, PixetSdk};

/// Find the factory configuration file in `dir`.
///
/// Exactly one `*.xml` file must be present; zero or several is a
/// configuration error. A missing directory counts as zero files.
pub fn discover_factory_config(dir: &Path) -> CameraResult<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CameraError::Configuration(format!(
                "factory directory {} does not exist; define a configuration file",
                dir.display()
            )))
        }
        Err(e) => return Err(e.into()),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "xml") {
            candidates.push(path);
        }
    }

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        n => Err(CameraError::Configuration(format!(
            "found {} *.xml files in {}; define a configuration file",
            n,
            dir.display()
        ))),
    }
}

/// Manages the SDK session and the selected detector.
pub struct PixetConnection {
    sdk: Arc<dyn PixetSdk>,
    device: Arc<dyn PixetDevice>,
    model: DeviceModel,
    config_file: PathBuf,
    closed: AtomicBool,
}

impl PixetConnection {
    /// Start the SDK, select the first detector and load its configuration.
    pub fn open(sdk: Arc<dyn PixetSdk>, config: &DetectorConfig) -> CameraResult<Self> {
        let config_file = match &config.config_file {
            Some(path) => path.clone(),
            None => discover_factory_config(&config.factory_dir)?,
        };

        sdk.start()?;
        info!("Pixet SDK started");

        match Self::bring_up(&sdk, &config_file) {
            Ok((device, model)) => Ok(Self {
                sdk,
                device,
                model,
                config_file,
                closed: AtomicBool::new(false),
            }),
            Err(e) => {
                sdk.exit();
                info!("Pixet SDK shut down after failed bring-up");
                Err(e)
            }
        }
    }

    fn bring_up(
        sdk: &Arc<dyn PixetSdk>,
        config_file: &Path,
    ) -> CameraResult<(Arc<dyn PixetDevice>, DeviceModel)> {
        let device = sdk
            .devices()
            .into_iter()
            .next()
            .ok_or(crate::error::SdkError::NoDevice)?;

        let full_name = device.full_name();
        let model = DeviceModel::from_full_name(&full_name)?;
        debug!(name = %full_name, model = model.as_str(), "Detector selected");

        device.load_config_from_file(config_file)?;
        info!(path = %config_file.display(), "Device configuration loaded");

        Ok((device, model))
    }

    /// The opened detector.
    pub fn device(&self) -> &Arc<dyn PixetDevice> {
        &self.device
    }

    /// Product line parsed from the device name.
    pub fn model(&self) -> DeviceModel {
        self.model
    }

    /// Chip family of the detector.
    pub fn family(&self) -> SensorFamily {
        self.model.family()
    }

    /// Configuration file loaded at bring-up.
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Shut the SDK down. Later calls are no-ops.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sdk.exit();
        info!("Pixet SDK shut down");
    }

    /// Whether the SDK has been shut down.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for PixetConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_discover_single_xml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("MiniPIX-J06-W0105.xml"), "<xml/>").unwrap();
        fs::write(dir.path().join("readme.txt"), "").unwrap();

        let found = discover_factory_config(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "MiniPIX-J06-W0105.xml");
    }

    #[test]
    fn test_discover_rejects_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.xml"), "").unwrap();
        fs::write(dir.path().join("b.xml"), "").unwrap();

        let err = discover_factory_config(dir.path()).unwrap_err();
        assert!(matches!(err, CameraError::Configuration(_)));
        assert!(err.to_string().contains('2'));
    }

    #[test]
    fn test_discover_rejects_empty_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_factory_config(dir.path()),
            Err(CameraError::Configuration(_))
        ));
        assert!(matches!(
            discover_factory_config(&dir.path().join("missing")),
            Err(CameraError::Configuration(_))
        ));
    }
}
