//! flashmap-sim - In-memory flash emulator for testing
//!
//! This crate provides a [`FlashDriver`] that emulates several flash devices
//! in memory. It's useful for testing flash maps and upgrade flows without
//! real hardware.
//!
//! The emulation follows NOR flash rules: programming can only clear bits
//! (new contents are ANDed into the old), and erase restores whole erase
//! units to the device's erased value. On top of that it offers:
//!
//! - an operation log ([`SimFlash::ops`])
//! - one-shot fault injection ([`SimFlash::fail_next`])
//! - detection of overlapping erases on one device, reported as
//!   [`DriverError::Busy`]
//! - linear reads for devices given a base address

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use flashmap_core::flash::{DriverResult, FlashDriver};
use flashmap_core::{DeviceId, DriverError, FlashMap, Operation};

/// Error code for misaligned or out of bounds requests
const EINVAL: i32 = -22;

/// Error code for requests to a device that does not exist
const ENODEV: i32 = -19;

/// Error code for linear reads outside every mapped window
const EFAULT: i32 = -14;

/// Configuration of one emulated device
#[derive(Debug, Clone)]
pub struct SimDevice {
    /// Device identifier
    pub id: DeviceId,
    /// Device size in bytes
    pub size: usize,
    /// Linear base address, if memory-mapped
    pub base: Option<usize>,
    /// Smallest erase unit
    pub erase_unit: u32,
    /// Value of erased bytes
    pub erased_val: u8,
}

impl SimDevice {
    /// A 4 KiB erase, 0xFF erased device of the given size
    pub fn new(id: DeviceId, size: usize) -> Self {
        Self {
            id,
            size,
            base: None,
            erase_unit: 4096,
            erased_val: 0xFF,
        }
    }

    /// Map the device linearly at `base`
    pub fn mapped(mut self, base: usize) -> Self {
        self.base = Some(base);
        self
    }

    /// Set the erase unit
    pub fn erase_unit(mut self, erase_unit: u32) -> Self {
        self.erase_unit = erase_unit;
        self
    }

    /// Set the erased byte value
    pub fn erased_val(mut self, erased_val: u8) -> Self {
        self.erased_val = erased_val;
        self
    }
}

/// Driver call recorded by the emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimOp {
    /// Kind of access
    pub op: Operation,
    /// Device accessed
    pub device: DeviceId,
    /// Device-relative offset
    pub offset: u32,
    /// Length in bytes
    pub len: u32,
    /// Served through the linear mapping
    pub linear: bool,
}

#[derive(Debug)]
struct DeviceState {
    config: SimDevice,
    data: Mutex<Vec<u8>>,
    erasing: AtomicBool,
}

/// Multi-device flash emulator
#[derive(Debug, Default)]
pub struct SimFlash {
    devices: Vec<DeviceState>,
    ops: Mutex<Vec<SimOp>>,
    faults: Mutex<Vec<(Operation, DriverError)>>,
    erase_delay: Option<Duration>,
}

impl SimFlash {
    /// Create an emulator without devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device, filled with its erased value
    pub fn with_device(mut self, config: SimDevice) -> Self {
        let data = vec![config.erased_val; config.size];
        self.devices.push(DeviceState {
            config,
            data: Mutex::new(data),
            erasing: AtomicBool::new(false),
        });
        self
    }

    /// Make every erase take at least `delay`
    ///
    /// Widens the window in which overlapping erases are detected.
    pub fn with_erase_delay(mut self, delay: Duration) -> Self {
        self.erase_delay = Some(delay);
        self
    }

    /// Create an emulator with one device per device of `map`
    ///
    /// Each device is sized to end with its last region.
    pub fn for_map(map: &FlashMap) -> Self {
        let mut sim = Self::new();
        for device in map.registry().iter() {
            let size = map
                .table()
                .on_device(device.id)
                .map(|r| r.end() as usize)
                .max()
                .unwrap_or(0)
                .max(device.erase_align as usize);
            let mut config = SimDevice::new(device.id, size)
                .erase_unit(device.erase_align)
                .erased_val(device.erased_val);
            config.base = device.base;
            sim = sim.with_device(config);
        }
        sim
    }

    fn device(&self, id: DeviceId) -> DriverResult<&DeviceState> {
        self.devices
            .iter()
            .find(|d| d.config.id == id)
            .ok_or(DriverError::Code(ENODEV))
    }

    /// Copy of a device's contents
    pub fn data(&self, id: DeviceId) -> Option<Vec<u8>> {
        let device = self.device(id).ok()?;
        let data = device.data.lock().ok()?;
        Some(data.clone())
    }

    /// Place bytes on a device directly, bypassing flash rules
    pub fn load_image(&self, id: DeviceId, offset: u32, image: &[u8]) -> DriverResult {
        let device = self.device(id)?;
        let mut data = device.data.lock().map_err(|_| DriverError::Io)?;
        let range = range(offset, image.len(), data.len())?;
        data[range].copy_from_slice(image);
        Ok(())
    }

    /// Recorded driver calls, oldest first
    pub fn ops(&self) -> Vec<SimOp> {
        self.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    /// Forget recorded driver calls
    pub fn clear_ops(&self) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.clear();
        }
    }

    /// Fail the next call of kind `op` with `cause`
    pub fn fail_next(&self, op: Operation, cause: DriverError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push((op, cause));
        }
    }

    fn record(&self, entry: SimOp) -> DriverResult {
        log::trace!(
            "sim {} device {} 0x{:X}+0x{:X}{}",
            entry.op,
            entry.device,
            entry.offset,
            entry.len,
            if entry.linear { " (linear)" } else { "" }
        );
        if let Ok(mut ops) = self.ops.lock() {
            ops.push(entry);
        }

        let mut faults = self.faults.lock().map_err(|_| DriverError::Io)?;
        if let Some(i) = faults.iter().position(|(op, _)| *op == entry.op) {
            let (_, cause) = faults.remove(i);
            log::debug!("sim injecting {} on {}", cause, entry.op);
            return Err(cause);
        }
        Ok(())
    }
}

fn range(offset: u32, len: usize, size: usize) -> DriverResult<std::ops::Range<usize>> {
    let start = offset as usize;
    match start.checked_add(len) {
        Some(end) if end <= size => Ok(start..end),
        _ => Err(DriverError::Code(EINVAL)),
    }
}

/// Clears the erase-in-progress flag on drop
struct EraseGuard<'a>(&'a AtomicBool);

impl Drop for EraseGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl FlashDriver for SimFlash {
    fn raw_read(&self, device: DeviceId, offset: u32, buf: &mut [u8]) -> DriverResult {
        self.record(SimOp {
            op: Operation::Read,
            device,
            offset,
            len: buf.len() as u32,
            linear: false,
        })?;

        let dev = self.device(device)?;
        let data = dev.data.lock().map_err(|_| DriverError::Io)?;
        buf.copy_from_slice(&data[range(offset, buf.len(), data.len())?]);
        Ok(())
    }

    fn raw_write(&self, device: DeviceId, offset: u32, bytes: &[u8]) -> DriverResult {
        self.record(SimOp {
            op: Operation::Write,
            device,
            offset,
            len: bytes.len() as u32,
            linear: false,
        })?;

        let dev = self.device(device)?;
        let mut data = dev.data.lock().map_err(|_| DriverError::Io)?;
        let range = range(offset, bytes.len(), data.len())?;

        // Flash programming: can only change 1 -> 0
        for (cell, &byte) in data[range].iter_mut().zip(bytes) {
            *cell &= byte;
        }
        Ok(())
    }

    fn raw_erase(&self, device: DeviceId, offset: u32, len: u32) -> DriverResult {
        self.record(SimOp {
            op: Operation::Erase,
            device,
            offset,
            len,
            linear: false,
        })?;

        let dev = self.device(device)?;
        let unit = dev.config.erase_unit;
        if !offset.is_multiple_of(unit) || !len.is_multiple_of(unit) {
            return Err(DriverError::Code(EINVAL));
        }

        if dev.erasing.swap(true, Ordering::Acquire) {
            log::debug!("sim device {} erase already in progress", device);
            return Err(DriverError::Busy);
        }
        let _erasing = EraseGuard(&dev.erasing);

        if let Some(delay) = self.erase_delay {
            std::thread::sleep(delay);
        }

        let mut data = dev.data.lock().map_err(|_| DriverError::Io)?;
        let range = range(offset, len as usize, data.len())?;
        data[range].fill(dev.config.erased_val);
        Ok(())
    }

    fn read_linear(&self, addr: usize, buf: &mut [u8]) -> DriverResult {
        let (dev, base) = self
            .devices
            .iter()
            .find_map(|d| {
                d.config
                    .base
                    .filter(|&base| addr >= base && addr - base < d.config.size)
                    .map(|base| (d, base))
            })
            .ok_or(DriverError::Code(EFAULT))?;

        let offset = (addr - base) as u32;
        self.record(SimOp {
            op: Operation::Read,
            device: dev.config.id,
            offset,
            len: buf.len() as u32,
            linear: true,
        })?;

        let data = dev.data.lock().map_err(|_| DriverError::Io)?;
        buf.copy_from_slice(&data[range(offset, buf.len(), data.len())?]);
        Ok(())
    }
}
