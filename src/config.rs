//! Application configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. A TOML file (`config/pixet.toml` unless another path is given)
//! 3. Environment variables prefixed with `PIXET_`, sections separated by `__`
//!
//! # Example
//! ```no_run
//! use pixet_camera::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! println!("Buffer slots: {}", config.buffer.slots);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Environment override: `PIXET_DETECTOR__ENERGY_THRESHOLD=8.5`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use pixet_core::limits::validate_energy_threshold;
use pixet_driver::mock::MockConfig;
use pixet_driver::DetectorConfig;
use serde::{Deserialize, Serialize};

use crate::device_server::DeviceProperties;
use crate::logging::OutputFormat;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/pixet.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PIXET_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Device-server properties
    #[serde(default)]
    pub device: DeviceProperties,
    /// Detector bring-up settings
    #[serde(default)]
    pub detector: DetectorConfig,
    /// Host frame buffer
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Simulated detector used when no SDK binding is linked
    #[serde(default)]
    pub simulator: MockConfig,
}

/// Host frame buffer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Number of frame slots in the ring
    #[serde(default = "default_slots")]
    pub slots: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_slots() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            slots: default_slots(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: OutputFormat::default(),
        }
    }
}

impl AppConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = Self::figment(path).extract().with_context(|| {
            format!("failed to load configuration from {}", path.display())
        })?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Layered provider for `path`, exposed for callers that merge more sources.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            );
        }

        if self.buffer.slots == 0 {
            bail!("Invalid buffer.slots 0. Must be at least 1");
        }

        if let Some(kev) = self.detector.energy_threshold {
            validate_energy_threshold("detector.energy_threshold", kev)?;
        }
        if let Some(kev) = self.device.energy_threshold {
            validate_energy_threshold("device.energy_threshold", kev)?;
        }

        if self.detector.stop_timeout.is_zero() {
            bail!("Invalid detector.stop_timeout: must be greater than zero");
        }

        let sim = &self.simulator;
        if sim.width == 0 || sim.height == 0 {
            bail!(
                "Invalid simulator geometry {}x{}: both sides must be non-zero",
                sim.width,
                sim.height
            );
        }
        if sim.chip_count == 0 {
            bail!("Invalid simulator.chip_count 0. Must be at least 1");
        }

        Ok(())
    }
}
