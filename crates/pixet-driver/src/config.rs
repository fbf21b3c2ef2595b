//! Detector bring-up settings.

use std::path::PathBuf;
use std::time::Duration;

use pixet_core::limits::{DEFAULT_START_SETTLE, DEFAULT_STOP_TIMEOUT};
use serde::{Deserialize, Serialize};

/// Default factory configuration directory of a Pixet installation.
pub const DEFAULT_FACTORY_DIR: &str = "/opt/pixet/factory";

fn default_factory_dir() -> PathBuf {
    PathBuf::from(DEFAULT_FACTORY_DIR)
}

fn default_stop_timeout() -> Duration {
    DEFAULT_STOP_TIMEOUT
}

fn default_start_settle() -> Duration {
    DEFAULT_START_SETTLE
}

/// Settings applied when the camera is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Device configuration file. When unset, the single `*.xml` in
    /// `factory_dir` is used.
    #[serde(default)]
    pub config_file: Option<PathBuf>,

    /// Directory searched for a factory configuration.
    #[serde(default = "default_factory_dir")]
    pub factory_dir: PathBuf,

    /// Energy threshold (keV) applied to every chip after bring-up.
    #[serde(default)]
    pub energy_threshold: Option<f64>,

    /// Operation mode applied after bring-up instead of the family default.
    #[serde(default)]
    pub operation_mode: Option<String>,

    /// Bound on joining the acquisition worker after an abort.
    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,

    /// Delay between spawning the worker and the first software trigger.
    #[serde(default = "default_start_settle", with = "humantime_serde")]
    pub start_settle: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            factory_dir: default_factory_dir(),
            energy_threshold: None,
            operation_mode: None,
            stop_timeout: default_stop_timeout(),
            start_settle: default_start_settle(),
        }
    }
}

impl DetectorConfig {
    /// Config using an explicit device configuration file.
    pub fn with_config_file(path: impl Into<PathBuf>) -> Self {
        Self {
            config_file: Some(path.into()),
            ..Self::default()
        }
    }
}
