//! Layout types
//!
//! Core region types that work in no_std environments without an allocator.

use core::fmt;

use crate::device::DeviceId;

/// Maximum number of sector runs per region
pub const MAX_SECTOR_RUNS: usize = 8;

/// Identifier of a flash region
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(transparent))]
pub struct RegionId(pub u8);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Run of equally sized sectors
///
/// Mixed geometries (e.g. 4 x 16 KiB followed by 1 x 64 KiB on STM32F4
/// style internal flash) are described by several consecutive runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct SectorRun {
    /// Size of each sector in this run, in bytes
    pub size: u32,
    /// Number of sectors in this run
    pub count: u32,
}

impl SectorRun {
    /// Create a new sector run
    pub const fn new(size: u32, count: u32) -> Self {
        Self { size, count }
    }

    /// Get the total size of this run in bytes
    pub const fn total_size(&self) -> u64 {
        self.size as u64 * self.count as u64
    }
}

/// One erase sector within a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sector {
    /// Sector index within the region, counting from 0
    pub index: u32,
    /// Region-relative start offset
    pub offset: u32,
    /// Sector size in bytes
    pub size: u32,
}

impl Sector {
    /// Region-relative end offset (exclusive)
    pub fn end(&self) -> u64 {
        self.offset as u64 + self.size as u64
    }

    /// Check if a region-relative offset falls inside this sector
    pub fn contains(&self, offset: u32) -> bool {
        offset >= self.offset && (offset as u64) < self.end()
    }
}

/// Region descriptor
///
/// A named byte range `[offset, offset + size)` on one device, together with
/// its sector geometry. Descriptors are plain `Copy` data and can be written
/// as `const` tables in firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDescriptor {
    /// Region identifier, unique across the table
    pub id: RegionId,
    /// Owning device
    pub device: DeviceId,
    /// Device-relative start offset
    pub offset: u32,
    /// Total size in bytes
    pub size: u32,
    run_count: u8,
    runs: [SectorRun; MAX_SECTOR_RUNS],
}

impl RegionDescriptor {
    /// Create a region made of equally sized sectors
    ///
    /// A size that is not a multiple of `sector_size` yields a descriptor
    /// whose geometry does not cover the region; the table rejects it.
    pub const fn uniform(
        id: RegionId,
        device: DeviceId,
        offset: u32,
        size: u32,
        sector_size: u32,
    ) -> Self {
        let count = if sector_size == 0 { 0 } else { size / sector_size };
        Self::with_runs(
            id,
            device,
            offset,
            size,
            &[SectorRun::new(sector_size, count)],
        )
    }

    /// Create a region from consecutive sector runs
    ///
    /// Only the first [`MAX_SECTOR_RUNS`] runs are kept.
    pub const fn with_runs(
        id: RegionId,
        device: DeviceId,
        offset: u32,
        size: u32,
        runs: &[SectorRun],
    ) -> Self {
        let mut region = Self {
            id,
            device,
            offset,
            size,
            run_count: 0,
            runs: [SectorRun::new(0, 0); MAX_SECTOR_RUNS],
        };
        let mut i = 0;
        while i < runs.len() && i < MAX_SECTOR_RUNS {
            region.runs[i] = runs[i];
            i += 1;
        }
        region.run_count = i as u8;
        region
    }

    /// Get the sector runs of this region
    pub fn runs(&self) -> &[SectorRun] {
        &self.runs[..self.run_count as usize]
    }

    /// Device-relative end offset (exclusive)
    pub fn end(&self) -> u64 {
        self.offset as u64 + self.size as u64
    }

    /// Total size covered by the sector runs
    pub fn sector_total(&self) -> u64 {
        self.runs().iter().map(|r| r.total_size()).sum()
    }

    /// Total number of sectors
    pub fn sector_count(&self) -> u64 {
        self.runs().iter().map(|r| r.count as u64).sum()
    }

    /// Check if the geometry uses a single sector size
    pub fn is_uniform(&self) -> bool {
        self.run_count == 1
    }

    /// Check if this region shares bytes with another on the same device
    pub fn overlaps(&self, other: &RegionDescriptor) -> bool {
        self.device == other.device
            && (self.offset as u64) < other.end()
            && (other.offset as u64) < self.end()
    }

    /// Check if `len` bytes starting at region offset `offset` fit in the region
    pub fn fits(&self, offset: u32, len: u32) -> bool {
        offset as u64 + len as u64 <= self.size as u64
    }

    /// Find the sector containing a region-relative offset
    pub fn sector_at(&self, offset: u32) -> Option<Sector> {
        if offset >= self.size {
            return None;
        }

        let mut base = 0u64;
        let mut index = 0u32;
        for run in self.runs() {
            let run_end = base + run.total_size();
            if (offset as u64) < run_end {
                let within = ((offset as u64 - base) / run.size as u64) as u32;
                return Some(Sector {
                    index: index + within,
                    offset: (base + within as u64 * run.size as u64) as u32,
                    size: run.size,
                });
            }
            base = run_end;
            index += run.count;
        }
        None
    }

    /// Check if a region-relative position is a sector boundary
    ///
    /// The end of the region counts as a boundary.
    pub fn is_sector_boundary(&self, pos: u64) -> bool {
        if pos == self.size as u64 {
            return true;
        }
        if pos > self.size as u64 {
            return false;
        }
        self.sector_at(pos as u32)
            .is_some_and(|s| s.offset as u64 == pos)
    }

    /// Iterate over all sectors in order
    pub fn sectors(&self) -> Sectors<'_> {
        Sectors {
            runs: self.runs(),
            run: 0,
            in_run: 0,
            index: 0,
            offset: 0,
        }
    }
}

/// Iterator over the sectors of a region
#[derive(Debug, Clone)]
pub struct Sectors<'a> {
    runs: &'a [SectorRun],
    run: usize,
    in_run: u32,
    index: u32,
    offset: u64,
}

impl Iterator for Sectors<'_> {
    type Item = Sector;

    fn next(&mut self) -> Option<Sector> {
        while let Some(run) = self.runs.get(self.run) {
            if self.in_run < run.count {
                let sector = Sector {
                    index: self.index,
                    offset: self.offset as u32,
                    size: run.size,
                };
                self.in_run += 1;
                self.index += 1;
                self.offset += run.size as u64;
                return Some(sector);
            }
            self.run += 1;
            self.in_run = 0;
        }
        None
    }
}

/// Source of the layout information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutSource {
    /// Tables compiled into the firmware
    Static,
    /// Map file loaded from a filesystem
    File,
    /// Map written to flash at manufacturing time
    FlashResident,
    /// Layout assembled by hand at runtime
    Manual,
}

impl fmt::Display for LayoutSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static table"),
            Self::File => write!(f, "map file"),
            Self::FlashResident => write!(f, "flash-resident map"),
            Self::Manual => write!(f, "manual layout"),
        }
    }
}

/// Errors that can occur when loading a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// Failed to parse the map file
    ParseError,
    /// Failed to read the map source
    IoError,
    /// Flash-resident map signature not found
    InvalidSignature,
    /// Flash-resident map version not supported
    UnsupportedVersion(u8),
    /// Map ends before all declared records
    Truncated,
    /// Unknown slot role encoding
    InvalidRole(u8),
    /// Region declares more than [`MAX_SECTOR_RUNS`] runs
    TooManyRuns(RegionId),
    /// Both explicit slots and a slot convention were given
    ConflictingSlotSources,
    /// Device base address does not fit the 32-bit map record
    BaseOutOfRange(DeviceId),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseError => write!(f, "failed to parse flash map"),
            Self::IoError => write!(f, "I/O error while reading flash map"),
            Self::InvalidSignature => write!(f, "invalid flash map signature"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported flash map version {}", v),
            Self::Truncated => write!(f, "flash map is truncated"),
            Self::InvalidRole(r) => write!(f, "invalid slot role {}", r),
            Self::TooManyRuns(id) => write!(
                f,
                "region {} has more than {} sector runs",
                id, MAX_SECTOR_RUNS
            ),
            Self::ConflictingSlotSources => {
                write!(f, "map declares both explicit slots and a slot convention")
            }
            Self::BaseOutOfRange(id) => {
                write!(f, "base address of device {} does not fit in 32 bits", id)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LayoutError {}
