//! Flash-resident binary map
//!
//! A compact map written to flash at manufacturing time, read back at boot
//! without an allocator. All records are little-endian and unaligned:
//!
//! ```text
//! header   magic "_FLAREA_", version, #devices, #regions, #slots   12 bytes
//! device   id, flags, erased value, -, write align, erase align, base  16 bytes
//! region   id, device, #runs, -, offset, size                       12 bytes
//!   run    sector size, count                                        8 bytes
//! slot     image, role, region, -                                    4 bytes
//! ```
//!
//! Each region record is immediately followed by its run records.

use heapless::Vec;
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::{
    FlashLayout, LayoutError, LayoutProvider, LayoutSource, RegionDescriptor, RegionId, SectorRun,
    MAX_SECTOR_RUNS,
};
use crate::device::{DeviceDescriptor, DeviceId};
use crate::error::{Error, Result};
use crate::flash::FlashDriver;
use crate::slot::{ImageIndex, SlotAssignment, SlotRole};

/// Map signature
pub const MAP_MAGIC: [u8; 8] = *b"_FLAREA_";

/// Supported map format version
pub const MAP_VERSION: u8 = 1;

/// Device flag: device has a linear mapping at `base`
const DEVICE_FLAG_MAPPED: u8 = 1 << 0;

/// Largest record, sizes the read buffer
const MAX_RECORD_SIZE: usize = 16;

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct MapHeader {
    magic: [u8; 8],
    version: u8,
    devices: u8,
    regions: u8,
    slots: u8,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct DeviceRecord {
    id: u8,
    flags: u8,
    erased_val: u8,
    reserved: u8,
    write_align: U32,
    erase_align: U32,
    base: U32,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct RegionRecord {
    id: u8,
    device: u8,
    run_count: u8,
    reserved: u8,
    offset: U32,
    size: U32,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct RunRecord {
    size: U32,
    count: U32,
}

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct SlotRecord {
    image: u8,
    role: u8,
    region: u8,
    reserved: u8,
}

/// Sequential record reader over a byte source
struct RecordReader<F> {
    read: F,
    pos: u32,
}

impl<F> RecordReader<F>
where
    F: FnMut(u32, &mut [u8]) -> Result<()>,
{
    fn next<T: FromBytes>(&mut self) -> Result<T> {
        let size = core::mem::size_of::<T>();
        let mut buf = [0u8; MAX_RECORD_SIZE];
        let buf = &mut buf[..size];
        (self.read)(self.pos, &mut *buf)?;
        self.pos += size as u32;
        T::read_from_bytes(buf).map_err(|_| LayoutError::Truncated.into())
    }
}

fn parse<F>(read: F) -> Result<FlashLayout>
where
    F: FnMut(u32, &mut [u8]) -> Result<()>,
{
    let mut reader = RecordReader { read, pos: 0 };

    let header: MapHeader = reader.next()?;
    if header.magic != MAP_MAGIC {
        return Err(LayoutError::InvalidSignature.into());
    }
    if header.version != MAP_VERSION {
        return Err(LayoutError::UnsupportedVersion(header.version).into());
    }

    let mut layout = FlashLayout::new(LayoutSource::FlashResident);

    for _ in 0..header.devices {
        let rec: DeviceRecord = reader.next()?;
        let id = DeviceId(rec.id);
        let write_align = rec.write_align.get();
        let erase_align = rec.erase_align.get();
        let device = if rec.flags & DEVICE_FLAG_MAPPED != 0 {
            DeviceDescriptor::memory_mapped(id, rec.base.get() as usize, write_align, erase_align)
        } else {
            DeviceDescriptor::new(id, write_align, erase_align)
        };
        layout.add_device(device.with_erased_val(rec.erased_val))?;
    }

    for _ in 0..header.regions {
        let rec: RegionRecord = reader.next()?;
        let id = RegionId(rec.id);
        if rec.run_count as usize > MAX_SECTOR_RUNS {
            return Err(LayoutError::TooManyRuns(id).into());
        }

        let mut runs: Vec<SectorRun, MAX_SECTOR_RUNS> = Vec::new();
        for _ in 0..rec.run_count {
            let run: RunRecord = reader.next()?;
            // run_count was checked against the capacity
            let _ = runs.push(SectorRun::new(run.size.get(), run.count.get()));
        }

        layout.add_region(RegionDescriptor::with_runs(
            id,
            DeviceId(rec.device),
            rec.offset.get(),
            rec.size.get(),
            &runs,
        ))?;
    }

    for _ in 0..header.slots {
        let rec: SlotRecord = reader.next()?;
        let role = SlotRole::from_index(rec.role).ok_or(LayoutError::InvalidRole(rec.role))?;
        layout.add_slot(SlotAssignment::new(
            ImageIndex(rec.image),
            role,
            RegionId(rec.region),
        ))?;
    }

    log::debug!(
        "Parsed flash-resident map: {} devices, {} regions, {} slots ({} bytes)",
        header.devices,
        header.regions,
        header.slots,
        reader.pos
    );
    Ok(layout)
}

/// Parse a flash-resident map from a byte buffer
///
/// Trailing bytes after the last record are ignored.
pub fn parse_map_blob(blob: &[u8]) -> Result<FlashLayout> {
    parse(|pos, buf| {
        let start = pos as usize;
        let src = start
            .checked_add(buf.len())
            .and_then(|end| blob.get(start..end))
            .ok_or(LayoutError::Truncated)?;
        buf.copy_from_slice(src);
        Ok(())
    })
}

/// Check if a buffer starts with a flash-resident map signature
pub fn has_map(data: &[u8]) -> bool {
    data.starts_with(&MAP_MAGIC)
}

/// Map stored on a flash device, read through its driver
///
/// Records are read one at a time so no buffer for the whole map is needed.
#[derive(Debug)]
pub struct FlashResidentLayout<'a, D: FlashDriver + ?Sized> {
    driver: &'a D,
    device: DeviceId,
    offset: u32,
}

impl<'a, D: FlashDriver + ?Sized> FlashResidentLayout<'a, D> {
    /// Map stored on `device` at device-relative `offset`
    pub fn new(driver: &'a D, device: DeviceId, offset: u32) -> Self {
        Self {
            driver,
            device,
            offset,
        }
    }
}

impl<D: FlashDriver + ?Sized> LayoutProvider for FlashResidentLayout<'_, D> {
    fn load(&mut self) -> Result<FlashLayout> {
        log::debug!(
            "Reading flash-resident map from device {} at 0x{:X}",
            self.device,
            self.offset
        );
        let (driver, device, base) = (self.driver, self.device, self.offset);
        parse(|pos, buf| {
            let offset = base.checked_add(pos).ok_or(LayoutError::Truncated)?;
            driver.raw_read(device, offset, buf).map_err(|e| {
                log::warn!("Reading map record at 0x{:X} failed: {}", offset, e);
                Error::Layout(LayoutError::IoError)
            })
        })
    }
}

/// Encode a validated map in the flash-resident format
///
/// Slots are always written as explicit assignments.
///
/// # Errors
/// * `BaseOutOfRange` - A device base address needs more than 32 bits
#[cfg(any(feature = "std", test))]
pub fn encode_map(map: &crate::FlashMap) -> Result<std::vec::Vec<u8>> {
    let registry = map.registry();
    let table = map.table();
    let slots = map.slots();

    let mut out = std::vec::Vec::new();
    let header = MapHeader {
        magic: MAP_MAGIC,
        version: MAP_VERSION,
        devices: registry.len() as u8,
        regions: table.len() as u8,
        slots: slots.len() as u8,
    };
    out.extend_from_slice(header.as_bytes());

    for device in registry.iter() {
        let base = match device.base {
            Some(base) => {
                u32::try_from(base).map_err(|_| LayoutError::BaseOutOfRange(device.id))?
            }
            None => 0,
        };
        let rec = DeviceRecord {
            id: device.id.0,
            flags: if device.is_memory_mapped() {
                DEVICE_FLAG_MAPPED
            } else {
                0
            },
            erased_val: device.erased_val,
            reserved: 0,
            write_align: U32::new(device.write_align),
            erase_align: U32::new(device.erase_align),
            base: U32::new(base),
        };
        out.extend_from_slice(rec.as_bytes());
    }

    for region in table.iter() {
        let rec = RegionRecord {
            id: region.id.0,
            device: region.device.0,
            run_count: region.runs().len() as u8,
            reserved: 0,
            offset: U32::new(region.offset),
            size: U32::new(region.size),
        };
        out.extend_from_slice(rec.as_bytes());
        for run in region.runs() {
            let rec = RunRecord {
                size: U32::new(run.size),
                count: U32::new(run.count),
            };
            out.extend_from_slice(rec.as_bytes());
        }
    }

    for slot in slots.iter() {
        let rec = SlotRecord {
            image: slot.key.image.0,
            role: slot.key.role.index(),
            region: slot.region.0,
            reserved: 0,
        };
        out.extend_from_slice(rec.as_bytes());
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::mock::MockDriver;
    use crate::layout::{SlotSource, StaticLayout};
    use crate::{DriverError, FlashMap};

    fn sample_map() -> FlashMap {
        let devices = [
            DeviceDescriptor::memory_mapped(DeviceId(0), 0x0800_0000, 8, 0x4000),
            DeviceDescriptor::new(DeviceId(1), 256, 4096).with_erased_val(0x00),
        ];
        let regions = [
            RegionDescriptor::with_runs(
                RegionId(0),
                DeviceId(0),
                0,
                0x20000,
                &[SectorRun::new(0x4000, 4), SectorRun::new(0x10000, 1)],
            ),
            RegionDescriptor::uniform(RegionId(1), DeviceId(1), 0, 0x40000, 4096),
            RegionDescriptor::uniform(RegionId(2), DeviceId(1), 0x40000, 0x40000, 4096),
        ];
        let slots = [
            SlotAssignment::new(ImageIndex(0), SlotRole::Primary, RegionId(0)),
            SlotAssignment::new(ImageIndex(0), SlotRole::Secondary, RegionId(1)),
            SlotAssignment::new(ImageIndex(0), SlotRole::Scratch, RegionId(2)),
        ];
        FlashMap::init(&mut StaticLayout::new(&devices, &regions, &slots)).unwrap()
    }

    fn header(version: u8, devices: u8, regions: u8, slots: u8) -> MapHeader {
        MapHeader {
            magic: MAP_MAGIC,
            version,
            devices,
            regions,
            slots,
        }
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(core::mem::size_of::<MapHeader>(), 12);
        assert_eq!(core::mem::size_of::<DeviceRecord>(), 16);
        assert_eq!(core::mem::size_of::<RegionRecord>(), 12);
        assert_eq!(core::mem::size_of::<RunRecord>(), 8);
        assert_eq!(core::mem::size_of::<SlotRecord>(), 4);
    }

    #[test]
    fn test_encoded_map_rebuilds_same_map() {
        let map = sample_map();
        let blob = encode_map(&map).unwrap();
        assert!(has_map(&blob));
        assert_eq!(blob.len(), 12 + 2 * 16 + 3 * 12 + 4 * 8 + 3 * 4);

        let layout = parse_map_blob(&blob).unwrap();
        assert_eq!(layout.source, LayoutSource::FlashResident);
        let rebuilt = FlashMap::from_layout(&layout).unwrap();

        assert!(rebuilt.table().iter().eq(map.table().iter()));
        assert!(rebuilt.registry().iter().eq(map.registry().iter()));
        assert!(rebuilt.slots().iter().eq(map.slots().iter()));
    }

    #[test]
    fn test_bad_signature() {
        let mut blob = encode_map(&sample_map()).unwrap();
        blob[0] = b'X';
        assert_eq!(
            parse_map_blob(&blob).unwrap_err(),
            Error::Layout(LayoutError::InvalidSignature)
        );
    }

    #[test]
    fn test_unsupported_version() {
        assert_eq!(
            parse_map_blob(header(2, 0, 0, 0).as_bytes()).unwrap_err(),
            Error::Layout(LayoutError::UnsupportedVersion(2))
        );
    }

    #[test]
    fn test_truncated() {
        let blob = encode_map(&sample_map()).unwrap();
        for len in [4, 12, 20, blob.len() - 1] {
            assert_eq!(
                parse_map_blob(&blob[..len]).unwrap_err(),
                Error::Layout(LayoutError::Truncated),
                "length {}",
                len
            );
        }
    }

    #[test]
    fn test_invalid_role() {
        let mut blob = header(1, 0, 0, 1).as_bytes().to_vec();
        blob.extend_from_slice(
            SlotRecord {
                image: 0,
                role: 7,
                region: 0,
                reserved: 0,
            }
            .as_bytes(),
        );
        assert_eq!(
            parse_map_blob(&blob).unwrap_err(),
            Error::Layout(LayoutError::InvalidRole(7))
        );
    }

    #[test]
    fn test_too_many_runs() {
        let mut blob = header(1, 0, 1, 0).as_bytes().to_vec();
        blob.extend_from_slice(
            RegionRecord {
                id: 5,
                device: 0,
                run_count: MAX_SECTOR_RUNS as u8 + 1,
                reserved: 0,
                offset: U32::new(0),
                size: U32::new(0x1000),
            }
            .as_bytes(),
        );
        assert_eq!(
            parse_map_blob(&blob).unwrap_err(),
            Error::Layout(LayoutError::TooManyRuns(RegionId(5)))
        );
    }

    #[test]
    fn test_base_out_of_range() {
        let devices = [DeviceDescriptor::memory_mapped(
            DeviceId(2),
            usize::MAX,
            4,
            4096,
        )];
        let map = FlashMap::init(&mut StaticLayout::new(&devices, &[], &[])).unwrap();
        assert_eq!(
            encode_map(&map).unwrap_err(),
            Error::Layout(LayoutError::BaseOutOfRange(DeviceId(2)))
        );
    }

    #[test]
    fn test_load_from_device() {
        let blob = encode_map(&sample_map()).unwrap();
        let driver = MockDriver::new().with_device(DeviceId(1), 0x1000, 0xFF);
        driver.fill(DeviceId(1), 0x100, &blob);

        let mut provider = FlashResidentLayout::new(&driver, DeviceId(1), 0x100);
        let map = FlashMap::init(&mut provider).unwrap();
        assert_eq!(map.source(), LayoutSource::FlashResident);
        assert_eq!(
            map.resolve_slot(ImageIndex(0), SlotRole::Scratch),
            Ok(RegionId(2))
        );
        assert!(matches!(
            parse_map_blob(&blob).unwrap().slots,
            SlotSource::Explicit(ref s) if s.len() == 3
        ));
    }

    #[test]
    fn test_load_driver_failure() {
        let driver = MockDriver::new().with_device(DeviceId(0), 0x100, 0xFF);
        driver.fail_next(DriverError::Io);
        assert_eq!(
            FlashResidentLayout::new(&driver, DeviceId(0), 0)
                .load()
                .unwrap_err(),
            Error::Layout(LayoutError::IoError)
        );
    }
}
