//! Flash access layer
//!
//! [`FlashDriver`] is the seam to the hardware. The free functions in this
//! module translate region-relative requests into checked driver calls.
//! Writes and erases require a [`DeviceGuard`] for the region's device.

mod driver;
mod lock;
#[cfg(test)]
pub(crate) mod mock;
mod operations;

pub use driver::{DriverResult, FlashDriver};
pub use lock::{DeviceGuard, DeviceLocks};
pub use operations::{erase, is_erased, read, verify, write};
