//! Error types shared by the host contract and camera adapters.
//!
//! This module defines the primary error type, `CameraError`. Using the `thiserror`
//! crate, it gives every layer of the adapter (settings, acquisition, frame delivery,
//! host interface) one consistent way to report failures.
//!
//! ## Error Hierarchy
//!
//! `CameraError` consolidates the failure classes a camera adapter can hit:
//!
//! - **`Configuration`**: fatal at construction (no unambiguous factory file,
//!   unsupported sensor model). No partial state is retained.
//! - **`Validation`** / **`NotSupported`**: a request was rejected synchronously and the
//!   previous setting is unchanged.
//! - **`Hardware`**: the detector reported a fault. Surfaced, never retried.
//! - **`BufferReleased`** / **`ShapeMismatch`**: host buffer lifecycle or geometry
//!   contract violated.
//! - **`ForcedTerminate`**: the acquisition worker did not stop within its bound.
//!
//! [`ErrorKind`] gives callers a coarse classification without matching every variant.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a [`CameraError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Construction-time configuration problem.
    Configuration,
    /// A request was rejected before reaching the hardware.
    Validation,
    /// The detector or its SDK reported a failure.
    Hardware,
    /// A collaborator's lifetime or shape contract was violated.
    Lifecycle,
    /// The adapter was driven out of sequence.
    State,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Validation => "validation",
            ErrorKind::Hardware => "hardware",
            ErrorKind::Lifecycle => "lifecycle",
            ErrorKind::State => "state",
        };
        write!(f, "{}", label)
    }
}

/// Convenience alias for results using the camera error type.
pub type CameraResult<T> = std::result::Result<T, CameraError>;

/// Primary error type for camera adapters.
#[derive(Error, Debug)]
pub enum CameraError {
    /// Construction-time configuration failure.
    ///
    /// Occurs when no unambiguous factory configuration file can be found, when the
    /// detector reports a model this adapter does not know, or when the hardware
    /// reports a pixel depth that has no image type.
    ///
    /// **Recovery Strategy**: fix the configuration and construct again.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A setting was out of range or otherwise invalid.
    ///
    /// The previous value of the setting is retained.
    #[error("Invalid {parameter}: {message}")]
    Validation {
        /// Name of the rejected setting.
        parameter: String,
        /// Human readable reason.
        message: String,
    },

    /// The request is valid in general but not for this detector or host mode.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// The detector or SDK reported a fault.
    ///
    /// **Recovery Strategy**: none automatic; requires an explicit hard reset.
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Operation called out of sequence (e.g. start before prepare).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The host released its buffer manager while the adapter still referenced it.
    #[error("Host buffer manager was released before the camera")]
    BufferReleased,

    /// A frame did not match the geometry negotiated with the host buffer.
    #[error("Frame shape mismatch: expected {expected:?} (height, width), got {actual:?}")]
    ShapeMismatch {
        /// Shape the host buffer was allocated for.
        expected: (usize, usize),
        /// Shape delivered by the detector.
        actual: (usize, usize),
    },

    /// The acquisition worker did not terminate within the join bound.
    ///
    /// The worker thread is detached and the camera is latched in the error state.
    #[error("Acquisition worker did not stop within {0:?}; forced terminate")]
    ForcedTerminate(Duration),

    /// Standard I/O operation failed (factory directory scan, config file access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CameraError {
    /// Build a validation error for `parameter`.
    pub fn validation(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CameraError::Configuration(_) | CameraError::Io(_) => ErrorKind::Configuration,
            CameraError::Validation { .. } | CameraError::NotSupported(_) => ErrorKind::Validation,
            CameraError::Hardware(_) | CameraError::ForcedTerminate(_) => ErrorKind::Hardware,
            CameraError::BufferReleased | CameraError::ShapeMismatch { .. } => {
                ErrorKind::Lifecycle
            }
            CameraError::InvalidState(_) => ErrorKind::State,
        }
    }

    /// True if the request was rejected without touching the hardware.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CameraError::validation("energy_threshold", "range = [0,120] keV");
        assert!(err.to_string().contains("energy_threshold"));
        assert!(err.to_string().contains("120"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            CameraError::NotSupported("threshold 1".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            CameraError::ForcedTerminate(Duration::from_secs(1)).kind(),
            ErrorKind::Hardware
        );
        assert_eq!(CameraError::BufferReleased.kind(), ErrorKind::Lifecycle);
        assert!(CameraError::validation("mode", "unknown").is_validation());
        assert!(!CameraError::Hardware("bias".into()).is_validation());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::Configuration.to_string(), "configuration");
        assert_eq!(ErrorKind::Lifecycle.to_string(), "lifecycle");
    }
}
