//! Device-server binding.
//!
//! Exposes one camera to a control system as a device with properties,
//! scalar attributes and an enumerated-value query. The server owns the
//! interface and the host buffer it was opened with; there is no process-wide
//! camera instance.
//!
//! # Attributes
//!
//! | name                  | type   | access     | unit |
//! |-----------------------|--------|------------|------|
//! | `bias_voltage`        | double | read/write | V    |
//! | `energy_threshold`    | double | read/write | keV  |
//! | `operation_mode`      | string | read/write | str  |
//! | `sensed_bias_voltage` | double | read       | V    |
//! | `sensed_bias_current` | double | read       | uA   |
//! | `temperature`         | double | read       | C    |

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use pixet_core::{AcqStatus, CameraError, CameraResult, HwInterface, MemoryBuffer};
use pixet_driver::sdk::PixetSdk;
use pixet_driver::{DetectorConfig, PixetInterface};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Device properties read at construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceProperties {
    /// Device configuration file; overrides factory discovery.
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    /// Energy threshold (keV) applied by [`DeviceServer::init_device`].
    #[serde(default)]
    pub energy_threshold: Option<f64>,
}

/// Device state as seen by the control system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevState {
    /// Idle and operational.
    On,
    /// Acquiring.
    Running,
    /// Camera fault latched.
    Fault,
    /// SDK shut down.
    Off,
}

impl fmt::Display for DevState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DevState::On => "ON",
            DevState::Running => "RUNNING",
            DevState::Fault => "FAULT",
            DevState::Off => "OFF",
        })
    }
}

/// Data type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    /// 64-bit float.
    Double,
    /// Free text or an enumerated label.
    String,
}

/// Client access to an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrAccess {
    /// Read-only.
    Read,
    /// Read and write.
    ReadWrite,
}

/// Static description of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrInfo {
    /// Attribute name as seen by clients.
    pub name: &'static str,
    /// Value type.
    pub data_type: AttrType,
    /// Client access.
    pub access: AttrAccess,
    /// Display unit, empty when unitless.
    pub unit: &'static str,
    /// printf-style display format, if any.
    pub format: Option<&'static str>,
    /// One-line description.
    pub description: &'static str,
}

impl AttrInfo {
    /// Whether clients may write the attribute.
    pub fn is_writable(&self) -> bool {
        self.access == AttrAccess::ReadWrite
    }

    /// Parse a raw string into a value of this attribute's type.
    pub fn parse(&self, raw: &str) -> CameraResult<AttrValue> {
        match self.data_type {
            AttrType::String => Ok(AttrValue::String(raw.to_string())),
            AttrType::Double => raw.trim().parse::<f64>().map(AttrValue::Double).map_err(|e| {
                CameraError::validation(self.name, format!("'{}' is not a number: {}", raw, e))
            }),
        }
    }
}

/// Attribute table.
pub const ATTRIBUTES: &[AttrInfo] = &[
    AttrInfo {
        name: "bias_voltage",
        data_type: AttrType::Double,
        access: AttrAccess::ReadWrite,
        unit: "V",
        format: Some("%1f"),
        description: "Bias high voltage in Volt",
    },
    AttrInfo {
        name: "energy_threshold",
        data_type: AttrType::Double,
        access: AttrAccess::ReadWrite,
        unit: "keV",
        format: Some("%1f"),
        description: "energy threshold in keV",
    },
    AttrInfo {
        name: "operation_mode",
        data_type: AttrType::String,
        access: AttrAccess::ReadWrite,
        unit: "str",
        format: None,
        description: "detector operation mode",
    },
    AttrInfo {
        name: "sensed_bias_voltage",
        data_type: AttrType::Double,
        access: AttrAccess::Read,
        unit: "V",
        format: Some("%1f"),
        description: "Bias voltage sense",
    },
    AttrInfo {
        name: "sensed_bias_current",
        data_type: AttrType::Double,
        access: AttrAccess::Read,
        unit: "uA",
        format: Some("%1f"),
        description: "Bias current sense",
    },
    AttrInfo {
        name: "temperature",
        data_type: AttrType::Double,
        access: AttrAccess::Read,
        unit: "C",
        format: Some("%1f"),
        description: "temperature",
    },
];

/// Attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Numeric value.
    Double(f64),
    /// Text value.
    String(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Double(v) => write!(f, "{}", v),
            AttrValue::String(s) => f.write_str(s),
        }
    }
}

/// Look an attribute up by name.
pub fn attr_info(name: &str) -> CameraResult<&'static AttrInfo> {
    ATTRIBUTES
        .iter()
        .find(|attr| attr.name == name)
        .ok_or_else(|| CameraError::NotSupported(format!("unknown attribute '{}'", name)))
}

/// One camera exposed as a control-system device.
pub struct DeviceServer {
    interface: PixetInterface,
    buffer: Arc<MemoryBuffer>,
    properties: DeviceProperties,
}

impl DeviceServer {
    /// Open the camera and run [`Self::init_device`].
    ///
    /// `properties.config_path`, when set, replaces the detector config file.
    pub fn new(
        sdk: Arc<dyn PixetSdk>,
        properties: DeviceProperties,
        detector: &DetectorConfig,
        buffer_slots: usize,
    ) -> CameraResult<Self> {
        let mut detector = detector.clone();
        match &properties.config_path {
            Some(path) => {
                info!(path = %path.display(), "Using configured device file");
                detector.config_file = Some(path.clone());
            }
            None if detector.config_file.is_none() => info!(
                dir = %detector.factory_dir.display(),
                "Using factory configuration"
            ),
            None => {}
        }

        let (interface, buffer) = PixetInterface::open(sdk, &detector, |dim| {
            MemoryBuffer::new(dim, buffer_slots)
        })?;
        let server = Self {
            interface,
            buffer,
            properties,
        };
        server.init_device()?;
        Ok(server)
    }

    /// Apply device properties to the camera.
    pub fn init_device(&self) -> CameraResult<()> {
        let features = self.interface.camera().features();
        info!(
            modes = ?features.operation_mode_choices(),
            "Operation modes"
        );
        if let Some(kev) = self.properties.energy_threshold {
            features.set_energy_threshold0(kev)?;
        }
        Ok(())
    }

    /// Hardware interface handed to the acquisition host.
    pub fn interface(&self) -> &PixetInterface {
        &self.interface
    }

    /// Frame buffer owned by the server.
    pub fn buffer(&self) -> &Arc<MemoryBuffer> {
        &self.buffer
    }

    /// Properties the device was created with.
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Device state derived from the camera's acquisition status.
    pub fn state(&self) -> DevState {
        if self.interface.camera().is_closed() {
            return DevState::Off;
        }
        match self.interface.status().acq {
            AcqStatus::Fault => DevState::Fault,
            AcqStatus::Running => DevState::Running,
            AcqStatus::Ready | AcqStatus::Config => DevState::On,
        }
    }

    /// Read an attribute from the detector.
    pub fn read_attribute(&self, name: &str) -> CameraResult<AttrValue> {
        let features = self.interface.camera().features();
        let value = match attr_info(name)?.name {
            "bias_voltage" => AttrValue::Double(features.bias_voltage()?),
            "energy_threshold" => AttrValue::Double(features.energy_threshold0()?),
            "operation_mode" => AttrValue::String(features.operation_mode()?.to_string()),
            "sensed_bias_voltage" => AttrValue::Double(features.sensed_bias_voltage()?),
            "sensed_bias_current" => AttrValue::Double(features.sensed_bias_current()?),
            "temperature" => AttrValue::Double(features.temperature()?),
            other => {
                return Err(CameraError::NotSupported(format!(
                    "attribute '{}' has no reader",
                    other
                )))
            }
        };
        Ok(value)
    }

    /// Write an attribute. Read-only attributes and values of the wrong type are rejected.
    pub fn write_attribute(&self, name: &str, value: AttrValue) -> CameraResult<()> {
        let info = attr_info(name)?;
        if !info.is_writable() {
            return Err(CameraError::validation(name, "attribute is read-only"));
        }
        let features = self.interface.camera().features();
        match (info.name, value) {
            ("bias_voltage", AttrValue::Double(v)) => features.set_bias_voltage(v),
            ("energy_threshold", AttrValue::Double(v)) => features.set_energy_threshold0(v),
            ("operation_mode", AttrValue::String(s)) => features.set_operation_mode_by_name(&s),
            (_, value) => Err(CameraError::validation(
                name,
                format!("value {:?} does not match type {:?}", value, info.data_type),
            )),
        }
    }

    /// Authorized values of an enumerated attribute; empty for free-form ones.
    pub fn attr_string_value_list(&self, name: &str) -> CameraResult<Vec<String>> {
        let info = attr_info(name)?;
        Ok(match info.name {
            "operation_mode" => self.interface.camera().features().operation_mode_choices(),
            _ => Vec::new(),
        })
    }

    /// Stop acquiring and shut the SDK down.
    pub fn delete_device(&self) {
        if let Err(e) = self.interface.stop_acq() {
            warn!(error = %e, "Stop during delete_device failed");
        }
        self.interface.quit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_table() {
        assert_eq!(ATTRIBUTES.len(), 6);
        let writable: Vec<_> = ATTRIBUTES
            .iter()
            .filter(|a| a.is_writable())
            .map(|a| a.name)
            .collect();
        assert_eq!(writable, vec!["bias_voltage", "energy_threshold", "operation_mode"]);
        assert_eq!(attr_info("sensed_bias_current").unwrap().unit, "uA");
        assert!(attr_info("humidity").is_err());
    }

    #[test]
    fn test_parse_values() {
        let bias = attr_info("bias_voltage").unwrap();
        assert_eq!(bias.parse(" -50.5 ").unwrap(), AttrValue::Double(-50.5));
        assert!(bias.parse("high").unwrap_err().is_validation());

        let mode = attr_info("operation_mode").unwrap();
        assert_eq!(
            mode.parse("ToA").unwrap(),
            AttrValue::String("ToA".into())
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(DevState::Fault.to_string(), "FAULT");
        assert_eq!(AttrValue::Double(3.5).to_string(), "3.5");
    }
}
