//! Error types for flashmap-core
//!
//! A single no_std compatible error type is shared by the device registry,
//! the region table, the slot resolver and the access layer. It is `Copy`
//! so it can be returned from a bootloader without allocation.

use core::fmt;

use crate::device::DeviceId;
use crate::layout::{LayoutError, RegionId};
use crate::slot::{ImageIndex, SlotKey, SlotRole};

/// Kind of access that reached the device driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Read (device-relative or linear)
    Read,
    /// Program
    Write,
    /// Sector erase
    Erase,
}

/// Failure reported by a flash device driver
///
/// The access layer never interprets these; they are passed through to the
/// caller inside [`Error::DeviceIo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// Generic I/O failure
    Io,
    /// Device is busy (e.g. another erase in progress on the same controller)
    Busy,
    /// Driver-side timeout
    Timeout,
    /// Device or block is write protected
    WriteProtected,
    /// The driver does not implement this access path
    Unsupported,
    /// Driver specific error code
    Code(i32),
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Registry errors
    /// A device with this id is already registered
    DuplicateDevice(DeviceId),
    /// No device with this id is registered
    UnknownDevice(DeviceId),
    /// The device has no linear address mapping
    NotMemoryMapped(DeviceId),
    /// The device declares a zero write or erase unit
    InvalidDeviceGeometry(DeviceId),

    // Region table errors
    /// Two regions on the same device share bytes
    OverlappingRegions {
        /// Region declared first
        first: RegionId,
        /// Region declared later
        second: RegionId,
    },
    /// A region references a device that is not registered
    DanglingDeviceReference {
        /// Offending region
        region: RegionId,
        /// Missing device
        device: DeviceId,
    },
    /// Region size is zero or does not match its sector geometry
    MisalignedRegionSize(RegionId),
    /// Region offset is not on a device erase boundary
    MisalignedRegionOffset(RegionId),
    /// Two regions share the same id
    DuplicateRegion(RegionId),
    /// No region with this id exists
    RegionNotFound(RegionId),
    /// Offset/length falls outside the region
    OutOfRange {
        /// Region being accessed
        region: RegionId,
        /// Region-relative offset
        offset: u32,
        /// Requested length in bytes
        len: u32,
    },

    // Slot errors
    /// The slot is not part of the mapping
    ///
    /// `slot` is the role ordinal (0 primary, 1 secondary, 2 scratch), so
    /// ordinals that name no role at all are reported the same way.
    UnknownSlot {
        /// Image the slot was resolved for
        image: ImageIndex,
        /// Slot ordinal
        slot: u8,
    },
    /// Two distinct slots resolve to the same region
    SlotAliasing {
        /// Slot declared first
        first: SlotKey,
        /// Slot declared later
        second: SlotKey,
        /// Region both slots point at
        region: RegionId,
    },
    /// The same slot was assigned twice
    DuplicateSlot(SlotKey),
    /// A declared role has no region for one of the configured images
    MissingSlot(SlotKey),
    /// A slot points at a region that is not in the table
    DanglingSlotReference {
        /// Offending slot
        slot: SlotKey,
        /// Missing region
        region: RegionId,
    },

    // Access errors
    /// Offset or length violates write alignment or sector boundaries
    AlignmentViolation {
        /// Region being accessed
        region: RegionId,
        /// Region-relative offset
        offset: u32,
        /// Requested length in bytes
        len: u32,
    },
    /// Write or erase attempted without holding the device lock
    LockNotHeld {
        /// Device that must be locked
        device: DeviceId,
    },
    /// Read-back data differs from the expected contents
    VerifyMismatch {
        /// Region being verified
        region: RegionId,
        /// Region-relative offset of the first differing byte
        offset: u32,
    },
    /// The device driver reported a failure
    DeviceIo {
        /// Region being accessed
        region: RegionId,
        /// Region-relative offset of the request
        offset: u32,
        /// Operation that failed
        op: Operation,
        /// Cause reported by the driver
        cause: DriverError,
    },

    // Infrastructure
    /// A fixed-capacity table is full
    TableFull,
    /// The layout source could not be loaded
    Layout(LayoutError),
}

impl Error {
    /// `UnknownSlot` for a slot key
    pub const fn unknown_slot(key: SlotKey) -> Self {
        Self::UnknownSlot {
            image: key.image,
            slot: key.role.index(),
        }
    }

    /// Whether this error can only happen while building the map
    ///
    /// Initialization must abort on these; a partially valid map is never
    /// handed out.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateDevice(_)
                | Self::InvalidDeviceGeometry(_)
                | Self::OverlappingRegions { .. }
                | Self::DanglingDeviceReference { .. }
                | Self::MisalignedRegionSize(_)
                | Self::MisalignedRegionOffset(_)
                | Self::DuplicateRegion(_)
                | Self::SlotAliasing { .. }
                | Self::DuplicateSlot(_)
                | Self::MissingSlot(_)
                | Self::DanglingSlotReference { .. }
                | Self::TableFull
                | Self::Layout(_)
        )
    }
}

impl From<LayoutError> for Error {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Erase => write!(f, "erase"),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "I/O error"),
            Self::Busy => write!(f, "device busy"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::WriteProtected => write!(f, "write protected"),
            Self::Unsupported => write!(f, "operation not supported by driver"),
            Self::Code(code) => write!(f, "driver error {}", code),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateDevice(id) => write!(f, "device {} registered twice", id),
            Self::UnknownDevice(id) => write!(f, "unknown device {}", id),
            Self::NotMemoryMapped(id) => write!(f, "device {} is not memory-mapped", id),
            Self::InvalidDeviceGeometry(id) => {
                write!(f, "device {} has a zero write or erase unit", id)
            }
            Self::OverlappingRegions { first, second } => {
                write!(f, "regions {} and {} overlap", first, second)
            }
            Self::DanglingDeviceReference { region, device } => {
                write!(f, "region {} references unknown device {}", region, device)
            }
            Self::MisalignedRegionSize(id) => {
                write!(f, "region {} size does not match its sector geometry", id)
            }
            Self::MisalignedRegionOffset(id) => {
                write!(f, "region {} does not start on an erase boundary", id)
            }
            Self::DuplicateRegion(id) => write!(f, "region {} declared twice", id),
            Self::RegionNotFound(id) => write!(f, "region {} not found", id),
            Self::OutOfRange {
                region,
                offset,
                len,
            } => write!(
                f,
                "range 0x{:X}+0x{:X} is outside region {}",
                offset, len, region
            ),
            Self::UnknownSlot { image, slot } => match SlotRole::from_index(*slot) {
                Some(role) => write!(f, "no region for {}", SlotKey::new(*image, role)),
                None => write!(f, "image {} has no slot ordinal {}", image, slot),
            },
            Self::SlotAliasing {
                first,
                second,
                region,
            } => write!(f, "{} and {} both map to region {}", first, second, region),
            Self::DuplicateSlot(key) => write!(f, "{} assigned twice", key),
            Self::MissingSlot(key) => write!(f, "{} has no region", key),
            Self::DanglingSlotReference { slot, region } => {
                write!(f, "{} references unknown region {}", slot, region)
            }
            Self::AlignmentViolation {
                region,
                offset,
                len,
            } => write!(
                f,
                "range 0x{:X}+0x{:X} in region {} is not aligned",
                offset, len, region
            ),
            Self::LockNotHeld { device } => {
                write!(f, "device {} must be locked for write/erase", device)
            }
            Self::VerifyMismatch { region, offset } => write!(
                f,
                "verify failed in region {} at offset 0x{:X}",
                region, offset
            ),
            Self::DeviceIo {
                region,
                offset,
                op,
                cause,
            } => write!(
                f,
                "{} of region {} at offset 0x{:X} failed: {}",
                op, region, offset, cause
            ),
            Self::TableFull => write!(f, "flash map table capacity exceeded"),
            Self::Layout(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
