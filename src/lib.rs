//! # pixet-camera
//!
//! Timepix3 / Medipix3 camera adapter for image-acquisition hosts.
//!
//! The adapter itself lives in the workspace crates:
//! - `pixet-core`: host-side contract (hardware interface, buffer manager, errors)
//! - `pixet-driver`: Pixet SDK adapter and simulated SDK
//!
//! This crate adds what a deployed device needs around them:
//! - [`config`]: layered configuration (defaults, TOML, environment)
//! - [`logging`]: tracing subscriber set-up
//! - [`device_server`]: control-system binding with properties and attributes

pub mod config;
pub mod device_server;
pub mod logging;

pub use config::AppConfig;
pub use device_server::{AttrValue, DevState, DeviceProperties, DeviceServer};
