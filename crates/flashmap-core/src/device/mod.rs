//! Flash device registry
//!
//! Devices are registered once at initialization. Everything else refers to
//! a device by its [`DeviceId`]; descriptors are never copied into regions.

mod registry;
mod types;

pub use registry::DeviceRegistry;
pub use types::*;
