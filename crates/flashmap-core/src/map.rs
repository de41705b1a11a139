//! Flash map
//!
//! [`FlashMap`] owns the validated device registry, region table and slot
//! map, plus one write/erase lock per device. It is built in one step from a
//! [`LayoutProvider`] and is read-only afterwards, so a shared reference can
//! be handed to every task that needs flash access.

use crate::device::{DeviceDescriptor, DeviceId, DeviceRegistry};
use crate::error::Result;
use crate::flash::{DeviceGuard, DeviceLocks};
use crate::layout::{
    FlashLayout, LayoutProvider, LayoutSource, RegionDescriptor, RegionId, RegionTable, Sector,
    Sectors, SlotSource,
};
use crate::slot::{ImageIndex, SlotMap, SlotRole};

/// Validated flash map
#[derive(Debug)]
pub struct FlashMap {
    source: LayoutSource,
    registry: DeviceRegistry,
    table: RegionTable,
    slots: SlotMap,
    locks: DeviceLocks,
}

impl FlashMap {
    /// Load a layout from `provider` and validate it
    ///
    /// Either the whole map is valid and returned, or the first violation is
    /// returned and nothing is kept.
    pub fn init<P: LayoutProvider + ?Sized>(provider: &mut P) -> Result<Self> {
        let layout = provider.load().inspect_err(|e| {
            log::error!("Failed to load flash layout: {}", e);
        })?;
        Self::from_layout(&layout)
    }

    /// Validate an already loaded layout
    pub fn from_layout(layout: &FlashLayout) -> Result<Self> {
        let map = Self::build(layout).inspect_err(|e| {
            log::error!("Rejected flash map from {}: {}", layout.source, e);
        })?;

        log::info!(
            "Flash map from {}: {} devices, {} regions, {} slots",
            map.source,
            map.registry.len(),
            map.table.len(),
            map.slots.len()
        );
        Ok(map)
    }

    fn build(layout: &FlashLayout) -> Result<Self> {
        let mut registry = DeviceRegistry::new();
        for device in &layout.devices {
            registry.register(*device)?;
        }

        let table = RegionTable::build(&registry, layout.regions.iter().copied())?;

        let slots = match &layout.slots {
            SlotSource::Explicit(assignments) => {
                SlotMap::build(&table, assignments.iter().copied())?
            }
            SlotSource::Convention {
                first_region,
                image_count,
                roles,
            } => SlotMap::from_convention(&table, *first_region, *image_count, roles)?,
        };

        let locks = DeviceLocks::new(&registry);
        Ok(Self {
            source: layout.source,
            registry,
            table,
            slots,
            locks,
        })
    }

    /// Where the layout came from
    pub fn source(&self) -> LayoutSource {
        self.source
    }

    /// Device registry
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Region table
    pub fn table(&self) -> &RegionTable {
        &self.table
    }

    /// Slot map
    pub fn slots(&self) -> &SlotMap {
        &self.slots
    }

    pub(crate) fn locks(&self) -> &DeviceLocks {
        &self.locks
    }

    /// Resolve an image slot to its region
    pub fn resolve_slot(&self, image: ImageIndex, role: SlotRole) -> Result<RegionId> {
        self.slots.resolve(image, role)
    }

    /// Resolve a slot ordinal of image 0 (0 primary, 1 secondary, 2 scratch)
    pub fn resolve_slot_index(&self, slot: u8) -> Result<RegionId> {
        self.slots.resolve_index(slot)
    }

    /// Resolve a slot ordinal of the given image
    pub fn resolve_image_slot_index(&self, image: ImageIndex, slot: u8) -> Result<RegionId> {
        self.slots.resolve_image_index(image, slot)
    }

    /// Get a region descriptor
    pub fn region_info(&self, region: RegionId) -> Result<&RegionDescriptor> {
        self.table.lookup(region)
    }

    /// Get the descriptor of a device
    pub fn device(&self, device: DeviceId) -> Result<&DeviceDescriptor> {
        self.registry.get(device)
    }

    /// Find the sector containing a region-relative offset
    pub fn sector_at(&self, region: RegionId, offset: u32) -> Result<Sector> {
        self.table.sector_at(region, offset)
    }

    /// Iterate over the sectors of a region
    pub fn sectors(&self, region: RegionId) -> Result<Sectors<'_>> {
        self.table.sectors(region)
    }

    /// Linear base address of a memory-mapped device
    pub fn device_base(&self, device: DeviceId) -> Result<usize> {
        self.registry.resolve_base(device)
    }

    /// Write unit of the device backing a region
    pub fn write_alignment(&self, region: RegionId) -> Result<u32> {
        let r = self.table.lookup(region)?;
        Ok(self.registry.get(r.device)?.write_align)
    }

    /// Erased byte value of the device backing a region
    pub fn erased_value(&self, region: RegionId) -> Result<u8> {
        let r = self.table.lookup(region)?;
        Ok(self.registry.get(r.device)?.erased_val)
    }

    /// Lock a device for write/erase, spinning until it is free
    pub fn lock_device(&self, device: DeviceId) -> Result<DeviceGuard<'_>> {
        self.locks.lock(device)
    }

    /// Try to lock a device without blocking
    pub fn try_lock_device(&self, device: DeviceId) -> Result<Option<DeviceGuard<'_>>> {
        self.locks.try_lock(device)
    }

    /// Lock the device backing a region
    pub fn lock_region(&self, region: RegionId) -> Result<DeviceGuard<'_>> {
        let r = self.table.lookup(region)?;
        self.locks.lock(r.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::layout::{SectorRun, StaticLayout};
    use crate::slot::{SlotAssignment, SlotKey};

    const A: RegionId = RegionId(1);
    const B: RegionId = RegionId(2);
    const C: RegionId = RegionId(3);

    const DEVICES: [DeviceDescriptor; 2] = [
        DeviceDescriptor::new(DeviceId(0), 512, 2048),
        DeviceDescriptor::memory_mapped(DeviceId(1), 0x1000_0000, 4, 4096),
    ];
    const SLOTS: [SlotAssignment; 2] = [
        SlotAssignment::new(ImageIndex(0), SlotRole::Primary, A),
        SlotAssignment::new(ImageIndex(0), SlotRole::Secondary, B),
    ];

    fn region(id: RegionId, device: u8, offset: u32, size: u32, sector: u32) -> RegionDescriptor {
        RegionDescriptor::uniform(id, DeviceId(device), offset, size, sector)
    }

    #[test]
    fn test_scenario_two_slots() {
        let regions = [
            region(A, 0, 0, 4096, 4096),
            region(B, 0, 4096, 4096, 4096),
        ];
        let map = FlashMap::init(&mut StaticLayout::new(&DEVICES, &regions, &SLOTS)).unwrap();

        assert_eq!(map.source(), LayoutSource::Static);
        assert_eq!(map.resolve_slot(ImageIndex(0), SlotRole::Primary), Ok(A));
        assert_eq!(map.resolve_slot(ImageIndex(0), SlotRole::Secondary), Ok(B));
        assert_eq!(map.resolve_slot_index(0), Ok(A));
        assert_eq!(map.resolve_slot_index(1), Ok(B));
        assert_eq!(
            map.resolve_slot(ImageIndex(0), SlotRole::Scratch),
            Err(Error::UnknownSlot {
                image: ImageIndex(0),
                slot: 2
            })
        );
        assert_eq!(map.write_alignment(A), Ok(512));
        assert_eq!(map.erased_value(B), Ok(0xFF));
        assert_eq!(map.region_info(B).unwrap().offset, 4096);
    }

    #[test]
    fn test_scenario_overlap() {
        let devices = [DeviceDescriptor::new(DeviceId(0), 512, 4096)];
        let regions = [
            region(A, 0, 0, 4096, 4096),
            region(B, 0, 4096, 4096, 4096),
            region(C, 0, 2048, 4096, 4096),
        ];
        assert_eq!(
            FlashMap::init(&mut StaticLayout::new(&devices, &regions, &SLOTS)).unwrap_err(),
            Error::OverlappingRegions {
                first: A,
                second: C
            }
        );
    }

    #[test]
    fn test_slot_errors_abort_init() {
        let regions = [region(A, 0, 0, 4096, 4096)];
        let err = FlashMap::init(&mut StaticLayout::new(&DEVICES, &regions, &SLOTS)).unwrap_err();
        assert_eq!(
            err,
            Error::DanglingSlotReference {
                slot: SlotKey::new(ImageIndex(0), SlotRole::Secondary),
                region: B
            }
        );
        assert!(err.is_build_error());
    }

    #[test]
    fn test_duplicate_device_aborts_init() {
        let devices = [DEVICES[0], DEVICES[0]];
        assert_eq!(
            FlashMap::init(&mut StaticLayout::new(&devices, &[], &[])).unwrap_err(),
            Error::DuplicateDevice(DeviceId(0))
        );
    }

    #[test]
    fn test_convention_layout() {
        let regions = [
            region(RegionId(0), 1, 0, 0x4000, 4096),
            region(RegionId(1), 1, 0x4000, 0x8000, 4096),
            region(RegionId(2), 1, 0xC000, 0x8000, 4096),
            region(RegionId(3), 1, 0x14000, 0x8000, 4096),
            region(RegionId(4), 1, 0x1C000, 0x8000, 4096),
        ];
        let map = FlashMap::init(&mut StaticLayout::with_convention(
            &DEVICES,
            &regions,
            RegionId(1),
            2,
            &[SlotRole::Primary, SlotRole::Secondary],
        ))
        .unwrap();

        assert_eq!(map.slots().image_count(), 2);
        assert_eq!(
            map.resolve_image_slot_index(ImageIndex(1), 0),
            Ok(RegionId(3))
        );
        assert_eq!(map.resolve_slot(ImageIndex(1), SlotRole::Secondary), Ok(RegionId(4)));
    }

    #[test]
    fn test_geometry_queries() {
        let regions = [RegionDescriptor::with_runs(
            A,
            DeviceId(1),
            0x8000,
            0x20000,
            &[SectorRun::new(0x4000, 4), SectorRun::new(0x10000, 1)],
        )];
        let map = FlashMap::init(&mut StaticLayout::new(&DEVICES, &regions, &[])).unwrap();

        assert_eq!(map.device_base(DeviceId(1)), Ok(0x1000_0000));
        assert_eq!(
            map.device_base(DeviceId(0)),
            Err(Error::NotMemoryMapped(DeviceId(0)))
        );
        assert_eq!(map.sector_at(A, 0x12345).unwrap().offset, 0x10000);
        assert_eq!(map.sectors(A).unwrap().count(), 5);
        assert!(map.slots().is_empty());
    }

    #[test]
    fn test_region_lock_follows_device() {
        let regions = [
            region(A, 0, 0, 4096, 4096),
            region(B, 0, 4096, 4096, 4096),
        ];
        let map = FlashMap::init(&mut StaticLayout::new(&DEVICES, &regions, &SLOTS)).unwrap();

        let guard = map.lock_region(A).unwrap();
        assert_eq!(guard.device(), DeviceId(0));
        assert!(map.try_lock_device(DeviceId(0)).unwrap().is_none());
        assert!(map.try_lock_device(DeviceId(1)).unwrap().is_some());
        drop(guard);
        assert!(map.try_lock_device(DeviceId(0)).unwrap().is_some());
    }

    struct FailingProvider;

    impl LayoutProvider for FailingProvider {
        fn load(&mut self) -> Result<FlashLayout> {
            Err(crate::layout::LayoutError::InvalidSignature.into())
        }
    }

    #[test]
    fn test_provider_failure() {
        assert_eq!(
            FlashMap::init(&mut FailingProvider).unwrap_err(),
            Error::Layout(crate::layout::LayoutError::InvalidSignature)
        );
    }
}
