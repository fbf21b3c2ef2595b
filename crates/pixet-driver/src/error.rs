//! Error types for Pixet SDK operations.
//!
//! `SdkError` covers the failure modes of the vendor SDK seam. Everything above
//! the seam works in [`CameraError`]; the `From` impl at the bottom of this file
//! classifies SDK failures for the host.

use std::path::PathBuf;

use pixet_core::CameraError;
use thiserror::Error;

/// Result type alias for SDK operations.
pub type SdkResult<T> = std::result::Result<T, SdkError>;

/// Errors reported by the Pixet SDK.
#[derive(Error, Debug)]
pub enum SdkError {
    /// The SDK core could not be started.
    #[error("Pixet core failed to start: {message}")]
    StartFailed { message: String },

    /// No detector is connected.
    #[error("No Pixet detector connected")]
    NoDevice,

    /// The device rejected its configuration file.
    #[error("Failed to load device configuration '{}': {message}", path.display())]
    ConfigLoad { path: PathBuf, message: String },

    /// The device rejected a parameter value.
    #[error("Device rejected {name}: {message}")]
    Parameter { name: String, message: String },

    /// The blocking acquisition call failed.
    #[error("Acquisition failed (rc {code}): {message}")]
    Acquisition { code: i32, message: String },

    /// The blocking acquisition call returned because it was aborted.
    #[error("Acquisition aborted")]
    Aborted,

    /// A software trigger was refused.
    #[error("Software trigger failed: {message}")]
    Trigger { message: String },

    /// No completed frame is available.
    #[error("No acquired frame available: {message}")]
    FrameUnavailable { message: String },

    /// Any other device failure.
    #[error("Device error (rc {code}): {message}")]
    Device { code: i32, message: String },
}

impl SdkError {
    /// Check if the error was caused by an abort request.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl From<SdkError> for CameraError {
    fn from(err: SdkError) -> Self {
        match &err {
            SdkError::StartFailed { .. } | SdkError::NoDevice | SdkError::ConfigLoad { .. } => {
                CameraError::Configuration(err.to_string())
            }
            SdkError::Parameter { .. }
            | SdkError::Acquisition { .. }
            | SdkError::Aborted
            | SdkError::Trigger { .. }
            | SdkError::FrameUnavailable { .. }
            | SdkError::Device { .. } => CameraError::Hardware(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixet_core::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = SdkError::ConfigLoad {
            path: PathBuf::from("/opt/pixet/factory/MiniPIX.xml"),
            message: "not found".into(),
        };
        assert!(err.to_string().contains("MiniPIX.xml"));
    }

    #[test]
    fn test_classification() {
        let err: CameraError = SdkError::NoDevice.into();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err: CameraError = SdkError::Trigger {
            message: "not armed".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Hardware);
        assert!(SdkError::Aborted.is_aborted());
    }
}
