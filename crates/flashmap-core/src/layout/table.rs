//! Region table
//!
//! The table is validated as a whole when it is built. A table that exists
//! has unique ids, geometry that exactly covers every region, and no two
//! regions sharing bytes on the same device.

use heapless::Vec;

use super::{RegionDescriptor, RegionId, Sector, Sectors};
use crate::device::{DeviceDescriptor, DeviceId, DeviceRegistry};
use crate::error::{Error, Result};
use crate::MAX_REGIONS;

/// Largest device-relative end offset a region may have
const DEVICE_ADDRESS_SPACE: u64 = 1 << 32;

/// Immutable, validated table of regions keyed by [`RegionId`]
#[derive(Debug, Clone)]
pub struct RegionTable {
    /// Sorted by id
    regions: Vec<RegionDescriptor, MAX_REGIONS>,
}

impl RegionTable {
    /// Validate descriptors against the registry and build the table
    ///
    /// Descriptors are checked in declaration order; the first violation
    /// aborts the build.
    ///
    /// # Errors
    /// * `DanglingDeviceReference` - Region names an unregistered device
    /// * `DuplicateRegion` - Region id used twice
    /// * `MisalignedRegionSize` - Size is zero, runs past the 32-bit device
    ///   address space, or does not match the sector geometry
    /// * `OverlappingRegions` - Region shares bytes with an earlier region on
    ///   the same device
    /// * `MisalignedRegionOffset` - Offset is not on an erase boundary
    /// * `TableFull` - More than [`MAX_REGIONS`] regions
    pub fn build<I>(registry: &DeviceRegistry, descriptors: I) -> Result<Self>
    where
        I: IntoIterator<Item = RegionDescriptor>,
    {
        let mut declared: Vec<RegionDescriptor, MAX_REGIONS> = Vec::new();

        for region in descriptors {
            let device = registry
                .get(region.device)
                .map_err(|_| Error::DanglingDeviceReference {
                    region: region.id,
                    device: region.device,
                })?;

            if declared.iter().any(|r| r.id == region.id) {
                return Err(Error::DuplicateRegion(region.id));
            }

            validate_geometry(&region, device)?;

            if let Some(first) = declared.iter().find(|r| r.overlaps(&region)) {
                return Err(Error::OverlappingRegions {
                    first: first.id,
                    second: region.id,
                });
            }

            if !region.offset.is_multiple_of(device.erase_align) {
                return Err(Error::MisalignedRegionOffset(region.id));
            }

            declared.push(region).map_err(|_| Error::TableFull)?;
        }

        declared.sort_unstable_by_key(|r| r.id);
        log::debug!("Built region table with {} regions", declared.len());
        Ok(Self { regions: declared })
    }

    /// Look up a region
    pub fn lookup(&self, id: RegionId) -> Result<&RegionDescriptor> {
        self.regions
            .binary_search_by_key(&id, |r| r.id)
            .map(|i| &self.regions[i])
            .map_err(|_| Error::RegionNotFound(id))
    }

    /// Find the sector containing a region-relative offset
    ///
    /// # Errors
    /// * `RegionNotFound` - No such region
    /// * `OutOfRange` - `offset >= size`
    pub fn sector_at(&self, id: RegionId, offset: u32) -> Result<Sector> {
        self.lookup(id)?
            .sector_at(offset)
            .ok_or(Error::OutOfRange {
                region: id,
                offset,
                len: 0,
            })
    }

    /// Iterate over the sectors of a region
    pub fn sectors(&self, id: RegionId) -> Result<Sectors<'_>> {
        Ok(self.lookup(id)?.sectors())
    }

    /// Iterate over all regions in id order
    pub fn iter(&self) -> impl Iterator<Item = &RegionDescriptor> {
        self.regions.iter()
    }

    /// Iterate over the regions of one device
    pub fn on_device(&self, device: DeviceId) -> impl Iterator<Item = &RegionDescriptor> {
        self.regions.iter().filter(move |r| r.device == device)
    }

    /// Get the number of regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

fn validate_geometry(region: &RegionDescriptor, device: &DeviceDescriptor) -> Result<()> {
    let misaligned = Error::MisalignedRegionSize(region.id);

    if region.size == 0 || region.runs().is_empty() {
        return Err(misaligned);
    }
    if region.end() > DEVICE_ADDRESS_SPACE {
        return Err(misaligned);
    }

    for run in region.runs() {
        if run.size == 0 || run.count == 0 || !run.size.is_multiple_of(device.erase_align) {
            return Err(misaligned);
        }
    }

    if region.sector_total() != region.size as u64 {
        return Err(misaligned);
    }

    Ok(())
}
