//! flashmap-core - Flash area map for bootloaders
//!
//! This crate answers three questions for firmware that performs image
//! upgrades: which device and byte range back a logical region, which
//! region holds a given image slot, and how to read, program and erase that
//! region without crossing its bounds or violating device alignment.
//!
//! It is `no_std` and allocation free. Tables live in fixed-capacity
//! `heapless` vectors and are built once by [`FlashMap::init`] from a
//! [`LayoutProvider`].
//!
//! # Features
//!
//! - `std` - Enable TOML map files, the flash-resident map encoder, serde
//!   derives and `std::error::Error` impls
//!
//! # Example
//!
//! ```ignore
//! use flashmap_core::{flash, FlashMap, ImageIndex, SlotRole, StaticLayout};
//!
//! let map = FlashMap::init(&mut StaticLayout::new(&DEVICES, &REGIONS, &SLOTS))?;
//! let secondary = map.resolve_slot(ImageIndex(0), SlotRole::Secondary)?;
//!
//! let guard = map.lock_region(secondary)?;
//! flash::erase(&map, &driver, &guard, secondary, 0, 4096)?;
//! flash::write(&map, &driver, &guard, secondary, 0, &image[..4096])?;
//! ```

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod device;
pub mod error;
pub mod flash;
pub mod layout;
mod map;
pub mod slot;

pub use device::{DeviceDescriptor, DeviceId, DeviceRegistry};
pub use error::{DriverError, Error, Operation, Result};
pub use flash::{DeviceGuard, FlashDriver};
pub use layout::{
    FlashLayout, FlashResidentLayout, LayoutError, LayoutProvider, LayoutSource,
    RegionDescriptor, RegionId, RegionTable, Sector, SectorRun, SlotSource, StaticLayout,
    StaticSlots,
};
#[cfg(feature = "std")]
pub use layout::TomlLayout;
pub use map::FlashMap;
pub use slot::{ImageIndex, SlotAssignment, SlotKey, SlotMap, SlotRole};

/// Maximum number of registered flash devices
pub const MAX_DEVICES: usize = 8;

/// Maximum number of regions in a table
pub const MAX_REGIONS: usize = 32;

/// Maximum number of slot assignments
pub const MAX_SLOTS: usize = 32;
