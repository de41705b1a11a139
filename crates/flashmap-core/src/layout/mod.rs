//! Flash layout support
//!
//! A layout names byte ranges (regions) on flash devices and assigns image
//! slots to them. Layouts can be:
//!
//! - Compiled into the firmware ([`StaticLayout`])
//! - Loaded from TOML map files (`TomlLayout`, `std` only)
//! - Read from a binary map stored in flash ([`FlashResidentLayout`])
//!
//! Every source produces the same unvalidated [`FlashLayout`]; validation
//! happens in [`RegionTable::build`] and [`crate::SlotMap::build`].

mod provider;
mod resident;
mod table;
#[cfg(feature = "std")]
mod toml;
mod types;

pub use provider::{
    FlashLayout, LayoutProvider, SlotSource, StaticLayout, StaticSlots, MAX_ROLES,
};
pub use resident::{has_map, parse_map_blob, FlashResidentLayout, MAP_MAGIC, MAP_VERSION};
pub use table::RegionTable;
pub use types::*;

#[cfg(any(feature = "std", test))]
pub use resident::encode_map;
#[cfg(feature = "std")]
pub use self::toml::{to_toml_string, TomlLayout};
