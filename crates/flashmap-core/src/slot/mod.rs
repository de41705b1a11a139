//! Image slot resolution
//!
//! Upgrade logic speaks only in `(image index, slot role)` terms. The
//! [`SlotMap`] turns such a pair into a region id, so that swapping between
//! primary and secondary never involves a physical offset.

mod map;
mod types;

pub use map::SlotMap;
pub use types::*;
