//! Device registry
//!
//! Resolves a [`DeviceId`] to its descriptor and, for memory-mapped devices,
//! its linear base address.

use heapless::Vec;

use super::{DeviceDescriptor, DeviceId};
use crate::error::{Error, Result};
use crate::MAX_DEVICES;

/// Registry of flash devices
///
/// Populated during initialization and read-only afterwards: once the
/// registry is moved into a [`crate::FlashMap`] only shared references are
/// handed out.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceDescriptor, MAX_DEVICES>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub const fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Register a device
    ///
    /// # Errors
    /// * `DuplicateDevice` - A device with the same id already exists
    /// * `InvalidDeviceGeometry` - Write or erase unit is zero, or the erase
    ///   unit is not a multiple of the write unit
    /// * `TableFull` - More than [`MAX_DEVICES`] devices
    pub fn register(&mut self, device: DeviceDescriptor) -> Result<()> {
        if self.contains(device.id) {
            return Err(Error::DuplicateDevice(device.id));
        }
        if device.write_align == 0
            || device.erase_align == 0
            || !device.erase_align.is_multiple_of(device.write_align)
        {
            return Err(Error::InvalidDeviceGeometry(device.id));
        }

        self.devices.push(device).map_err(|_| Error::TableFull)?;
        log::debug!(
            "Registered flash device {} (write unit {}, erase unit {}, {})",
            device.id,
            device.write_align,
            device.erase_align,
            if device.is_memory_mapped() {
                "memory-mapped"
            } else {
                "driver only"
            }
        );
        Ok(())
    }

    /// Get a device descriptor
    pub fn get(&self, id: DeviceId) -> Result<&DeviceDescriptor> {
        self.devices
            .iter()
            .find(|d| d.id == id)
            .ok_or(Error::UnknownDevice(id))
    }

    /// Resolve the linear base address of a memory-mapped device
    ///
    /// # Errors
    /// * `UnknownDevice` - No such device
    /// * `NotMemoryMapped` - The device must be accessed through driver
    ///   calls with device-relative offsets instead
    pub fn resolve_base(&self, id: DeviceId) -> Result<usize> {
        self.get(id)?.base.ok_or(Error::NotMemoryMapped(id))
    }

    /// Check if a device is registered
    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.iter().any(|d| d.id == id)
    }

    /// Iterate over registered devices in registration order
    pub fn iter(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.devices.iter()
    }

    /// Get the number of devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
