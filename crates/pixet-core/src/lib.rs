//! `pixet-core`
//!
//! Host-side contract for pixel-detector camera adapters.
//!
//! A host acquisition framework talks to a camera through a small set of
//! capability objects. This crate defines that contract so adapters and hosts can
//! be built and tested independently of any detector SDK.
//!
//! ## Key Types
//!
//! - [`HwInterface`]: lifecycle calls (prepare, start, stop, status, reset)
//! - [`DetInfoCtrl`] / [`SyncCtrl`]: detector information and synchronisation
//! - [`BufferManager`]: host frame storage, with [`MemoryBuffer`] as an in-memory ring
//! - [`CameraError`]: error type shared by every layer

pub mod buffer;
pub mod error;
pub mod hw;
pub mod limits;

pub use buffer::{BufferManager, FrameDim, FrameInfo, MemoryBuffer};
pub use error::{CameraError, CameraResult, ErrorKind};
pub use hw::{
    AcqStatus, DetInfoCtrl, DetStatus, HwCap, HwInterface, HwStatus, ImageType,
    MaxImageSizeCallback, ResetLevel, Size, SyncCtrl, TrigMode, ValidRanges,
};
