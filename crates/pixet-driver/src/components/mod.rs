//! Camera components.
//!
//! - `connection`: SDK start-up, detector selection, shutdown
//! - `features`: typed detector settings
//! - `acquisition`: session state machine, worker and frame consumer
//! - `bridge`: frame delivery into the host buffer

pub mod acquisition;
pub mod bridge;
pub mod connection;
pub mod features;
