//! Layout providers
//!
//! A flash map can come from tables compiled into the firmware, from a map
//! file on a filesystem, or from a binary map written to flash at
//! manufacturing time. Each source implements [`LayoutProvider`] and yields
//! the same unvalidated [`FlashLayout`]; [`crate::FlashMap::init`] never
//! looks at where the layout came from.

use heapless::Vec;

use super::{LayoutSource, RegionDescriptor, RegionId};
use crate::device::DeviceDescriptor;
use crate::error::{Error, Result};
use crate::slot::{SlotAssignment, SlotRole};
use crate::{MAX_DEVICES, MAX_REGIONS, MAX_SLOTS};

/// Number of distinct slot roles
pub const MAX_ROLES: usize = 3;

/// How slots map onto regions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSource {
    /// Explicit `(image, role) -> region` assignments
    Explicit(Vec<SlotAssignment, MAX_SLOTS>),
    /// Regions numbered by convention
    ///
    /// Image `i`, role at position `p` of `roles` lives in region
    /// `first_region + i * roles.len() + p`.
    Convention {
        /// Region of image 0, first role
        first_region: RegionId,
        /// Number of images
        image_count: u8,
        /// Roles in region order
        roles: Vec<SlotRole, MAX_ROLES>,
    },
}

impl Default for SlotSource {
    fn default() -> Self {
        Self::Explicit(Vec::new())
    }
}

/// Raw layout as produced by a provider, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashLayout {
    /// Where this layout came from
    pub source: LayoutSource,
    /// Devices in registration order
    pub devices: Vec<DeviceDescriptor, MAX_DEVICES>,
    /// Regions in declaration order
    pub regions: Vec<RegionDescriptor, MAX_REGIONS>,
    /// Slot mapping source
    pub slots: SlotSource,
}

impl FlashLayout {
    /// Create an empty layout from the given source
    pub fn new(source: LayoutSource) -> Self {
        Self {
            source,
            devices: Vec::new(),
            regions: Vec::new(),
            slots: SlotSource::default(),
        }
    }

    /// Add a device
    pub fn add_device(&mut self, device: DeviceDescriptor) -> Result<()> {
        self.devices.push(device).map_err(|_| Error::TableFull)
    }

    /// Add a region
    pub fn add_region(&mut self, region: RegionDescriptor) -> Result<()> {
        self.regions.push(region).map_err(|_| Error::TableFull)
    }

    /// Add an explicit slot assignment
    ///
    /// Replaces a previously configured convention.
    pub fn add_slot(&mut self, slot: SlotAssignment) -> Result<()> {
        if let SlotSource::Explicit(slots) = &mut self.slots {
            return slots.push(slot).map_err(|_| Error::TableFull);
        }
        let mut slots = Vec::new();
        slots.push(slot).map_err(|_| Error::TableFull)?;
        self.slots = SlotSource::Explicit(slots);
        Ok(())
    }

    /// Derive slots by convention instead of explicit assignments
    pub fn set_slot_convention(
        &mut self,
        first_region: RegionId,
        image_count: u8,
        roles: &[SlotRole],
    ) -> Result<()> {
        let roles = Vec::from_slice(roles).map_err(|_| Error::TableFull)?;
        self.slots = SlotSource::Convention {
            first_region,
            image_count,
            roles,
        };
        Ok(())
    }
}

/// Source of a flash layout
pub trait LayoutProvider {
    /// Produce the layout
    ///
    /// Called once during initialization. Validation is left to
    /// [`crate::FlashMap::init`].
    fn load(&mut self) -> Result<FlashLayout>;
}

/// Slot description for [`StaticLayout`]
#[derive(Debug, Clone, Copy)]
pub enum StaticSlots<'a> {
    /// Explicit assignments
    Explicit(&'a [SlotAssignment]),
    /// Numbered by convention, see [`SlotSource::Convention`]
    Convention {
        /// Region of image 0, first role
        first_region: RegionId,
        /// Number of images
        image_count: u8,
        /// Roles in region order
        roles: &'a [SlotRole],
    },
}

/// Layout compiled into the firmware
///
/// ```ignore
/// const DEVICES: [DeviceDescriptor; 1] =
///     [DeviceDescriptor::memory_mapped(DeviceId(0), 0x0800_0000, 8, 0x800)];
/// const REGIONS: [RegionDescriptor; 2] = [
///     RegionDescriptor::uniform(RegionId(1), DeviceId(0), 0x8000, 0x38000, 0x800),
///     RegionDescriptor::uniform(RegionId(2), DeviceId(0), 0x40000, 0x38000, 0x800),
/// ];
/// const SLOTS: [SlotAssignment; 2] = [
///     SlotAssignment::new(ImageIndex(0), SlotRole::Primary, RegionId(1)),
///     SlotAssignment::new(ImageIndex(0), SlotRole::Secondary, RegionId(2)),
/// ];
///
/// let map = FlashMap::init(&mut StaticLayout::new(&DEVICES, &REGIONS, &SLOTS))?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct StaticLayout<'a> {
    devices: &'a [DeviceDescriptor],
    regions: &'a [RegionDescriptor],
    slots: StaticSlots<'a>,
}

impl<'a> StaticLayout<'a> {
    /// Static layout with explicit slot assignments
    pub const fn new(
        devices: &'a [DeviceDescriptor],
        regions: &'a [RegionDescriptor],
        slots: &'a [SlotAssignment],
    ) -> Self {
        Self {
            devices,
            regions,
            slots: StaticSlots::Explicit(slots),
        }
    }

    /// Static layout with conventionally numbered slots
    pub const fn with_convention(
        devices: &'a [DeviceDescriptor],
        regions: &'a [RegionDescriptor],
        first_region: RegionId,
        image_count: u8,
        roles: &'a [SlotRole],
    ) -> Self {
        Self {
            devices,
            regions,
            slots: StaticSlots::Convention {
                first_region,
                image_count,
                roles,
            },
        }
    }
}

impl LayoutProvider for StaticLayout<'_> {
    fn load(&mut self) -> Result<FlashLayout> {
        let mut layout = FlashLayout::new(LayoutSource::Static);
        layout.devices = Vec::from_slice(self.devices).map_err(|_| Error::TableFull)?;
        layout.regions = Vec::from_slice(self.regions).map_err(|_| Error::TableFull)?;
        match self.slots {
            StaticSlots::Explicit(slots) => {
                layout.slots =
                    SlotSource::Explicit(Vec::from_slice(slots).map_err(|_| Error::TableFull)?);
            }
            StaticSlots::Convention {
                first_region,
                image_count,
                roles,
            } => layout.set_slot_convention(first_region, image_count, roles)?,
        }
        Ok(layout)
    }
}
