//! Pixet camera driver for Timepix3 and Medipix3 detectors.
//!
//! Adapts the Advacam Pixet SDK (MiniPIX, AdvaPIX, WidePIX) to the host
//! hardware-interface contract defined in `pixet-core`.
//!
//! # Architecture
//!
//! The driver is organized into components:
//! - `components::connection`: factory configuration discovery, SDK start-up and shutdown
//! - `components::features`: typed settings (thresholds, bias, operation mode)
//! - `components::acquisition`: session state machine, worker and frame consumer
//! - `components::bridge`: frame delivery into the host buffer
//!
//! On top of those, [`PixetCamera`] bundles one opened detector and
//! [`PixetInterface`] exposes it to the host together with [`PixetDetInfo`] and
//! [`PixetSyncCtrl`].
//!
//! # Features
//!
//! - `mock` (default): simulated SDK in [`mock`], no hardware required
//!
//! # Example
//!
//! ```rust,no_run
//! # #[cfg(feature = "mock")]
//! # fn example() -> pixet_core::CameraResult<()> {
//! use std::sync::Arc;
//! use pixet_core::{HwInterface, MemoryBuffer, SyncCtrl};
//! use pixet_driver::mock::{MockConfig, MockPixet};
//! use pixet_driver::{DetectorConfig, PixetInterface};
//!
//! let sdk = Arc::new(MockPixet::new(MockConfig::minipix()));
//! let config = DetectorConfig::with_config_file("/opt/pixet/factory/MiniPIX-J06-W0105.xml");
//! let (interface, buffer) = PixetInterface::open(sdk, &config, |dim| MemoryBuffer::new(dim, 16))?;
//!
//! interface.sync().set_nb_frames(10);
//! interface.prepare_acq()?;
//! interface.start_acq()?;
//! # let _ = buffer;
//! # Ok(())
//! # }
//! ```

pub mod camera;
pub mod components;
pub mod config;
pub mod det_info;
pub mod error;
pub mod family;
pub mod interface;
pub mod sdk;
pub mod sync_ctrl;

#[cfg(feature = "mock")]
pub mod mock;

pub use camera::PixetCamera;
pub use components::acquisition::CameraStatus;
pub use config::DetectorConfig;
pub use det_info::PixetDetInfo;
pub use error::{SdkError, SdkResult};
pub use family::{DeviceModel, OperationMode, SensorFamily, TriggerMode};
pub use interface::PixetInterface;
pub use sync_ctrl::PixetSyncCtrl;
