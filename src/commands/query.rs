//! Slot and sector queries

use super::{format_size, load_map};
use crate::error::Result;
use flashmap_core::{ImageIndex, RegionId, SlotRole};
use std::path::Path;

/// Resolve an image slot
pub fn cmd_slot(file: &Path, role: SlotRole, image: u8) -> Result<()> {
    let (map, _) = load_map(file)?;
    let region = map.resolve_slot(ImageIndex(image), role)?;
    let info = map.region_info(region)?;

    println!(
        "image {} {} slot -> region {} (device {}, {:#010X}, {})",
        image,
        role,
        region,
        info.device,
        info.offset,
        format_size(info.size)
    );
    Ok(())
}

/// Find the sector containing a region-relative offset
pub fn cmd_sector(file: &Path, region: u8, offset: u32) -> Result<()> {
    let (map, _) = load_map(file)?;
    let region = RegionId(region);
    let sector = map.sector_at(region, offset)?;
    let info = map.region_info(region)?;

    println!(
        "region {} offset {:#X} -> sector {} at {:#X} ({}), device offset {:#010X}",
        region,
        offset,
        sector.index,
        sector.offset,
        format_size(sector.size),
        info.offset + sector.offset
    );
    Ok(())
}
