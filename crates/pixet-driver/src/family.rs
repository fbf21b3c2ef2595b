//! Sensor families and their static capability table.
//!
//! The Pixet SDK serves two chip families through the same device API. Which
//! operation modes exist, how many energy thresholds a chip carries, where the
//! pixel counts live in an acquired frame and how deep each pixel is all depend
//! on the family, so they are gathered here instead of being re-derived from
//! the model string at every call site.

use std::fmt;

use pixet_core::{CameraError, CameraResult, TrigMode};

/// Chip family of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorFamily {
    /// Timepix3 (MiniPIX, AdvaPIX).
    Timepix3,
    /// Medipix3 (WidePIX).
    Medipix3,
}

/// Where the counts of an acquired frame are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelSource {
    /// The frame's own 2-D data.
    Direct,
    /// One of the frame's sub-frames (channel index).
    SubFrame(usize),
}

/// Acquisition type passed to the blocking SDK call.
///
/// Only frame readout is used: the host consumes whole frames, and the
/// data-driven pixel stream has no frame boundaries to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcqType {
    /// Frame based readout.
    Frames,
}

/// Static capabilities of a sensor family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyCaps {
    /// Detector type reported to the host.
    pub detector_type: &'static str,
    /// Operation modes the chip supports.
    pub operation_modes: &'static [OperationMode],
    /// Mode applied at bring-up.
    pub default_operation_mode: OperationMode,
    /// Number of energy thresholds per chip.
    pub threshold_count: usize,
    /// Location of the pixel counts in an acquired frame.
    pub pixel_source: PixelSource,
    /// Acquisition type used for host-driven frames.
    pub acq_type: AcqType,
}

const TIMEPIX3_CAPS: FamilyCaps = FamilyCaps {
    detector_type: "Timepix3",
    operation_modes: &[
        OperationMode::ToaTot,
        OperationMode::Toa,
        OperationMode::EventItot,
        OperationMode::TotNotoa,
    ],
    default_operation_mode: OperationMode::EventItot,
    threshold_count: 1,
    // Sub-frame 1 is the event-count channel.
    pixel_source: PixelSource::SubFrame(1),
    acq_type: AcqType::Frames,
};

const MEDIPIX3_CAPS: FamilyCaps = FamilyCaps {
    detector_type: "Medipix3",
    operation_modes: &[
        OperationMode::Spm1Ch,
        OperationMode::Spm2Ch,
        OperationMode::Csm,
    ],
    default_operation_mode: OperationMode::Spm1Ch,
    threshold_count: 2,
    pixel_source: PixelSource::Direct,
    acq_type: AcqType::Frames,
};

/// Fixed Timepix3 pixel depth (14-bit iToT plus 10-bit hit counter, delivered as 16 bit).
pub const TIMEPIX3_BIT_DEPTH: u32 = 16;

impl SensorFamily {
    /// Capability table entry for this family.
    pub fn caps(self) -> &'static FamilyCaps {
        match self {
            SensorFamily::Timepix3 => &TIMEPIX3_CAPS,
            SensorFamily::Medipix3 => &MEDIPIX3_CAPS,
        }
    }

    /// Check whether `mode` belongs to this family.
    pub fn supports(self, mode: OperationMode) -> bool {
        self.caps().operation_modes.contains(&mode)
    }

    /// Pixel depth in bits.
    ///
    /// Medipix3 depth follows the configured counter depth (2 -> 12 bit,
    /// 3 -> 24 bit); any other counter depth is a configuration error.
    pub fn bit_depth(self, counter_depth: impl FnOnce() -> CameraResult<u32>) -> CameraResult<u32> {
        match self {
            SensorFamily::Timepix3 => Ok(TIMEPIX3_BIT_DEPTH),
            SensorFamily::Medipix3 => match counter_depth()? {
                2 => Ok(12),
                3 => Ok(24),
                other => Err(CameraError::Configuration(format!(
                    "unsupported Medipix3 counter depth {}",
                    other
                ))),
            },
        }
    }
}

impl fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.caps().detector_type)
    }
}

/// Detector product line, parsed from the device full name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceModel {
    /// Single-chip Timepix3 USB detector.
    MiniPix,
    /// Timepix3 detector with a fast readout.
    AdvaPix,
    /// Multi-chip Medipix3 detector.
    WidePix,
}

impl DeviceModel {
    /// Parse the model from the first word of a device full name
    /// (e.g. `"MiniPIX TPX3 J06-W0105"`).
    pub fn from_full_name(full_name: &str) -> CameraResult<Self> {
        let word = full_name
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match word.as_str() {
            "minipix" => Ok(DeviceModel::MiniPix),
            "advapix" => Ok(DeviceModel::AdvaPix),
            "widepix" => Ok(DeviceModel::WidePix),
            _ => Err(CameraError::Configuration(format!(
                "model name is '{}'; only minipix, advapix and widepix are supported",
                word
            ))),
        }
    }

    /// Family of the chips fitted to this model.
    pub fn family(self) -> SensorFamily {
        match self {
            DeviceModel::MiniPix | DeviceModel::AdvaPix => SensorFamily::Timepix3,
            DeviceModel::WidePix => SensorFamily::Medipix3,
        }
    }

    /// Lower-case model keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceModel::MiniPix => "minipix",
            DeviceModel::AdvaPix => "advapix",
            DeviceModel::WidePix => "widepix",
        }
    }
}

/// Chip operation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationMode {
    /// Timepix3 time-of-arrival and time-over-threshold.
    ToaTot,
    /// Timepix3 time-of-arrival only.
    Toa,
    /// Timepix3 event count and integral ToT.
    EventItot,
    /// Timepix3 time-over-threshold without ToA.
    TotNotoa,
    /// Medipix3 single pixel mode, one counter.
    Spm1Ch,
    /// Medipix3 single pixel mode, two counters.
    Spm2Ch,
    /// Medipix3 charge summing mode.
    Csm,
}

impl OperationMode {
    /// Every operation mode across all families.
    pub const ALL: [OperationMode; 7] = [
        OperationMode::ToaTot,
        OperationMode::Toa,
        OperationMode::EventItot,
        OperationMode::TotNotoa,
        OperationMode::Spm1Ch,
        OperationMode::Spm2Ch,
        OperationMode::Csm,
    ];

    /// Mode from its SDK name (e.g. `"ToA"`).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.as_str() == s)
    }

    /// SDK name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationMode::ToaTot => "ToA+ToT",
            OperationMode::Toa => "ToA",
            OperationMode::EventItot => "Event+iToT",
            OperationMode::TotNotoa => "ToT",
            OperationMode::Spm1Ch => "SPM_1ch",
            OperationMode::Spm2Ch => "SPM_2ch",
            OperationMode::Csm => "CSM",
        }
    }

    /// Family the mode belongs to.
    pub fn family(self) -> SensorFamily {
        match self {
            OperationMode::ToaTot
            | OperationMode::Toa
            | OperationMode::EventItot
            | OperationMode::TotNotoa => SensorFamily::Timepix3,
            OperationMode::Spm1Ch | OperationMode::Spm2Ch | OperationMode::Csm => {
                SensorFamily::Medipix3
            }
        }
    }

    /// Mode names valid for `family`.
    pub fn all_choices(family: SensorFamily) -> Vec<String> {
        family
            .caps()
            .operation_modes
            .iter()
            .map(|mode| mode.as_str().to_string())
            .collect()
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Native SDK trigger mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriggerMode {
    /// One trigger starts the whole burst.
    #[default]
    Normal,
    /// Each frame waits for its own software trigger.
    SoftwareStart,
}

impl TriggerMode {
    /// Mode from its name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Normal" => Some(TriggerMode::Normal),
            "SoftwareStart" => Some(TriggerMode::SoftwareStart),
            _ => None,
        }
    }

    /// Name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMode::Normal => "Normal",
            TriggerMode::SoftwareStart => "SoftwareStart",
        }
    }

    /// Names of every trigger mode.
    pub fn all_choices() -> Vec<String> {
        vec!["Normal".into(), "SoftwareStart".into()]
    }

    /// Native mode for a host trigger mode, if one exists.
    pub fn from_host(mode: TrigMode) -> Option<Self> {
        match mode {
            TrigMode::IntTrig => Some(TriggerMode::Normal),
            TrigMode::IntTrigMult => Some(TriggerMode::SoftwareStart),
            _ => None,
        }
    }

    /// Host trigger mode this mode is exposed as.
    pub fn to_host(self) -> TrigMode {
        match self {
            TriggerMode::Normal => TrigMode::IntTrig,
            TriggerMode::SoftwareStart => TrigMode::IntTrigMult,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_from_full_name() {
        assert_eq!(
            DeviceModel::from_full_name("MiniPIX TPX3 J06-W0105").unwrap(),
            DeviceModel::MiniPix
        );
        assert_eq!(
            DeviceModel::from_full_name("AdvaPIX TPX3 H04").unwrap().family(),
            SensorFamily::Timepix3
        );
        assert_eq!(
            DeviceModel::from_full_name("WidePIX 2x10 MPX3").unwrap().family(),
            SensorFamily::Medipix3
        );
        assert!(DeviceModel::from_full_name("FitPIX X").is_err());
        assert!(DeviceModel::from_full_name("").is_err());
    }

    #[test]
    fn test_operation_mode_names() {
        for mode in OperationMode::ALL {
            assert_eq!(OperationMode::from_str(mode.as_str()), Some(mode));
            assert!(mode.family().supports(mode));
        }
        assert_eq!(OperationMode::from_str("event+itot"), None);
        assert_eq!(
            OperationMode::all_choices(SensorFamily::Medipix3),
            vec!["SPM_1ch", "SPM_2ch", "CSM"]
        );
    }

    #[test]
    fn test_bit_depth() {
        assert_eq!(SensorFamily::Timepix3.bit_depth(|| Ok(7)).unwrap(), 16);
        assert_eq!(SensorFamily::Medipix3.bit_depth(|| Ok(2)).unwrap(), 12);
        assert_eq!(SensorFamily::Medipix3.bit_depth(|| Ok(3)).unwrap(), 24);
        assert!(SensorFamily::Medipix3.bit_depth(|| Ok(1)).is_err());
    }

    #[test]
    fn test_trigger_mapping() {
        for mode in TrigMode::ALL {
            match TriggerMode::from_host(mode) {
                Some(native) => assert_eq!(native.to_host(), mode),
                None => assert!(!matches!(mode, TrigMode::IntTrig | TrigMode::IntTrigMult)),
            }
        }
    }

    #[test]
    fn test_family_caps() {
        assert_eq!(SensorFamily::Timepix3.caps().threshold_count, 1);
        assert_eq!(SensorFamily::Medipix3.caps().threshold_count, 2);
        assert_eq!(
            SensorFamily::Timepix3.caps().pixel_source,
            PixelSource::SubFrame(1)
        );
        assert!(!SensorFamily::Timepix3.supports(OperationMode::Csm));
    }
}
