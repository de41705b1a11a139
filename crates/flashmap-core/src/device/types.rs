//! Device types

use core::fmt;

/// Identifier of a physical flash device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(transparent))]
pub struct DeviceId(pub u8);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Value a NOR cell reads back after erase
pub const DEFAULT_ERASED_VALUE: u8 = 0xFF;

/// Static description of a flash device
///
/// A device with a base address is memory-mapped: its contents can be read
/// through linear addresses. Note that a base of `0` is a real mapping (many
/// MCUs map internal flash at address zero), so absence is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Device identifier
    pub id: DeviceId,
    /// Linear base address, if memory-mapped
    pub base: Option<usize>,
    /// Program unit in bytes; write offsets and lengths are multiples of it
    pub write_align: u32,
    /// Smallest erase unit in bytes; sector sizes are multiples of it
    pub erase_align: u32,
    /// Byte value of erased flash
    pub erased_val: u8,
}

impl DeviceDescriptor {
    /// Describe a device that is only reachable through driver calls
    pub const fn new(id: DeviceId, write_align: u32, erase_align: u32) -> Self {
        Self {
            id,
            base: None,
            write_align,
            erase_align,
            erased_val: DEFAULT_ERASED_VALUE,
        }
    }

    /// Describe a memory-mapped device with the given linear base address
    pub const fn memory_mapped(
        id: DeviceId,
        base: usize,
        write_align: u32,
        erase_align: u32,
    ) -> Self {
        Self {
            id,
            base: Some(base),
            write_align,
            erase_align,
            erased_val: DEFAULT_ERASED_VALUE,
        }
    }

    /// Override the erased byte value (e.g. 0x00 for some internal flashes)
    pub const fn with_erased_val(mut self, erased_val: u8) -> Self {
        self.erased_val = erased_val;
        self
    }

    /// Check if the device has a linear mapping
    pub const fn is_memory_mapped(&self) -> bool {
        self.base.is_some()
    }

    /// Check if an offset/length pair is a multiple of the write unit
    pub fn is_write_aligned(&self, offset: u32, len: u32) -> bool {
        offset.is_multiple_of(self.write_align) && len.is_multiple_of(self.write_align)
    }
}
