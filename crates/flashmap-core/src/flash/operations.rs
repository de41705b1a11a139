//! Region-checked flash operations
//!
//! Every operation addresses a region by id and a region-relative offset.
//! Bounds and alignment are checked against the region table before the
//! driver is called, so a request can never touch bytes outside its region.
//! Driver failures are wrapped in [`Error::DeviceIo`] and never retried.

use super::driver::FlashDriver;
use super::lock::DeviceGuard;
use crate::device::DeviceDescriptor;
use crate::error::{DriverError, Error, Operation, Result};
use crate::layout::{RegionDescriptor, RegionId};
use crate::map::FlashMap;

/// Chunk size used by verify and blank check
const CHUNK_SIZE: usize = 256;

/// Look up a region and its device
fn resolve(map: &FlashMap, region: RegionId) -> Result<(&RegionDescriptor, &DeviceDescriptor)> {
    let r = map.table().lookup(region)?;
    let device = map.registry().get(r.device)?;
    Ok((r, device))
}

/// Check that `len` bytes at `offset` fit in the region
fn check_range(region: &RegionDescriptor, offset: u32, len: usize) -> Result<u32> {
    let out_of_range = Error::OutOfRange {
        region: region.id,
        offset,
        len: u32::try_from(len).unwrap_or(u32::MAX),
    };
    let len = u32::try_from(len).map_err(|_| out_of_range)?;
    if !region.fits(offset, len) {
        return Err(out_of_range);
    }
    Ok(len)
}

/// Check that the guard locks the region's device and came from this map
fn check_guard(map: &FlashMap, guard: &DeviceGuard<'_>, region: &RegionDescriptor) -> Result<()> {
    if !guard.is_from(map.locks()) || guard.device() != region.device {
        return Err(Error::LockNotHeld {
            device: region.device,
        });
    }
    Ok(())
}

fn device_io(region: RegionId, offset: u32, op: Operation) -> impl FnOnce(DriverError) -> Error {
    move |cause| {
        log::warn!(
            "{} of region {} at offset 0x{:X} failed: {}",
            op,
            region,
            offset,
            cause
        );
        Error::DeviceIo {
            region,
            offset,
            op,
            cause,
        }
    }
}

/// Read bytes from a region
///
/// Memory-mapped devices are read through [`FlashDriver::read_linear`] at
/// `base + region offset + offset`; drivers without linear access fall back
/// to [`FlashDriver::raw_read`]. Reads need no lock.
///
/// # Errors
/// * `RegionNotFound` - Unknown region
/// * `OutOfRange` - `offset + buf.len()` exceeds the region size
/// * `DeviceIo` - Driver failure
pub fn read<D: FlashDriver + ?Sized>(
    map: &FlashMap,
    driver: &D,
    region: RegionId,
    offset: u32,
    buf: &mut [u8],
) -> Result<()> {
    let (r, device) = resolve(map, region)?;
    let len = check_range(r, offset, buf.len())?;
    if len == 0 {
        return Ok(());
    }

    let dev_offset = r.offset + offset;
    log::trace!(
        "read region {} +0x{:X} len 0x{:X} (device {} 0x{:X})",
        region,
        offset,
        len,
        r.device,
        dev_offset
    );

    if let Some(addr) = device
        .base
        .and_then(|base| base.checked_add(dev_offset as usize))
    {
        match driver.read_linear(addr, buf) {
            Ok(()) => return Ok(()),
            Err(DriverError::Unsupported) => {}
            Err(cause) => return Err(device_io(region, offset, Operation::Read)(cause)),
        }
    }

    driver
        .raw_read(r.device, dev_offset, buf)
        .map_err(device_io(region, offset, Operation::Read))
}

/// Program bytes into a region
///
/// The target range must be erased. `offset` and `data.len()` must be
/// multiples of the device write unit.
///
/// # Errors
/// * `LockNotHeld` - `guard` does not lock the region's device
/// * `OutOfRange` - Range exceeds the region
/// * `AlignmentViolation` - Offset or length not write aligned
/// * `DeviceIo` - Driver failure
pub fn write<D: FlashDriver + ?Sized>(
    map: &FlashMap,
    driver: &D,
    guard: &DeviceGuard<'_>,
    region: RegionId,
    offset: u32,
    data: &[u8],
) -> Result<()> {
    let (r, device) = resolve(map, region)?;
    check_guard(map, guard, r)?;
    let len = check_range(r, offset, data.len())?;

    // Region offsets are erase aligned, which implies write aligned
    if !device.is_write_aligned(offset, len) {
        return Err(Error::AlignmentViolation {
            region,
            offset,
            len,
        });
    }
    if len == 0 {
        return Ok(());
    }

    let dev_offset = r.offset + offset;
    log::trace!(
        "write region {} +0x{:X} len 0x{:X} (device {} 0x{:X})",
        region,
        offset,
        len,
        r.device,
        dev_offset
    );
    driver
        .raw_write(r.device, dev_offset, data)
        .map_err(device_io(region, offset, Operation::Write))
}

/// Erase whole sectors of a region
///
/// `offset` must be the start of a sector and `offset + len` must be a
/// sector boundary or the end of the region.
///
/// # Errors
/// * `LockNotHeld` - `guard` does not lock the region's device
/// * `OutOfRange` - Range exceeds the region
/// * `AlignmentViolation` - Range does not cover whole sectors
/// * `DeviceIo` - Driver failure
pub fn erase<D: FlashDriver + ?Sized>(
    map: &FlashMap,
    driver: &D,
    guard: &DeviceGuard<'_>,
    region: RegionId,
    offset: u32,
    len: u32,
) -> Result<()> {
    let (r, _) = resolve(map, region)?;
    check_guard(map, guard, r)?;

    let sector = r.sector_at(offset).ok_or(Error::OutOfRange {
        region,
        offset,
        len,
    })?;
    if sector.offset != offset {
        return Err(Error::AlignmentViolation {
            region,
            offset,
            len,
        });
    }
    check_range(r, offset, len as usize)?;
    if !r.is_sector_boundary(offset as u64 + len as u64) {
        return Err(Error::AlignmentViolation {
            region,
            offset,
            len,
        });
    }
    if len == 0 {
        return Ok(());
    }

    let dev_offset = r.offset + offset;
    log::trace!(
        "erase region {} +0x{:X} len 0x{:X} (device {} 0x{:X})",
        region,
        offset,
        len,
        r.device,
        dev_offset
    );
    driver
        .raw_erase(r.device, dev_offset, len)
        .map_err(device_io(region, offset, Operation::Erase))
}

/// Verify region contents match the provided data
///
/// # Errors
/// * `OutOfRange` - Range exceeds the region
/// * `VerifyMismatch` - Carries the offset of the first differing byte
/// * `DeviceIo` - Driver failure
pub fn verify<D: FlashDriver + ?Sized>(
    map: &FlashMap,
    driver: &D,
    region: RegionId,
    offset: u32,
    expected: &[u8],
) -> Result<()> {
    let (r, _) = resolve(map, region)?;
    check_range(r, offset, expected.len())?;

    let mut buf = [0u8; CHUNK_SIZE];
    let mut pos = offset;
    for chunk in expected.chunks(CHUNK_SIZE) {
        let have = &mut buf[..chunk.len()];
        read(map, driver, region, pos, have)?;

        if let Some(i) = have.iter().zip(chunk).position(|(h, w)| h != w) {
            return Err(Error::VerifyMismatch {
                region,
                offset: pos + i as u32,
            });
        }
        pos += chunk.len() as u32;
    }

    Ok(())
}

/// Check whether a range holds only the device's erased value
///
/// # Errors
/// * `OutOfRange` - Range exceeds the region
/// * `DeviceIo` - Driver failure
pub fn is_erased<D: FlashDriver + ?Sized>(
    map: &FlashMap,
    driver: &D,
    region: RegionId,
    offset: u32,
    len: u32,
) -> Result<bool> {
    let (r, device) = resolve(map, region)?;
    check_range(r, offset, len as usize)?;

    let mut buf = [0u8; CHUNK_SIZE];
    let mut pos = offset;
    let end = offset + len;
    while pos < end {
        let chunk_len = core::cmp::min(CHUNK_SIZE as u32, end - pos) as usize;
        let chunk = &mut buf[..chunk_len];
        read(map, driver, region, pos, chunk)?;

        if chunk.iter().any(|&b| b != device.erased_val) {
            return Ok(false);
        }
        pos += chunk_len as u32;
    }

    Ok(true)
}
