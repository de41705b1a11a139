//! Map command implementations

use super::{format_size, load_map};
use crate::error::{CliError, Result};
use flashmap_core::layout::{encode_map, has_map, to_toml_string};
use flashmap_core::{DeviceId, FlashMap, FlashResidentLayout, RegionDescriptor};
use flashmap_sim::{SimDevice, SimFlash};
use std::fs;
use std::path::Path;

/// Show a map file
pub fn cmd_show(file: &Path) -> Result<()> {
    let (map, name) = load_map(file)?;
    print_map(&map, name.as_deref());
    Ok(())
}

/// Validate a map file
pub fn cmd_check(file: &Path) -> Result<()> {
    let (map, _) = load_map(file)?;
    println!(
        "{}: OK ({} devices, {} regions, {} slots)",
        file.display(),
        map.registry().len(),
        map.table().len(),
        map.slots().len()
    );
    Ok(())
}

/// Write the flash-resident form of a map file
pub fn cmd_export(file: &Path, output: &Path) -> Result<()> {
    let (map, _) = load_map(file)?;
    let blob = encode_map(&map)?;
    fs::write(output, &blob).map_err(CliError::io(output))?;
    println!("Wrote {} byte map to {}", blob.len(), output.display());
    Ok(())
}

/// Extract a flash-resident map from a flash image
///
/// The image is loaded into an emulated device and read back through the
/// same provider firmware uses at boot.
pub fn cmd_import(image: &Path, offset: u32, output: Option<&Path>) -> Result<()> {
    let data = fs::read(image).map_err(CliError::io(image))?;

    let found = data
        .get(offset as usize..)
        .is_some_and(has_map);
    if !found {
        return Err(CliError::NoMap(offset));
    }

    let sim = SimFlash::new().with_device(SimDevice::new(DeviceId(0), data.len()));
    sim.load_image(DeviceId(0), 0, &data).map_err(CliError::Sim)?;
    let map = FlashMap::init(&mut FlashResidentLayout::new(&sim, DeviceId(0), offset))?;
    print_map(&map, None);

    let toml = to_toml_string(&map, None)?;
    if let Some(out) = output {
        fs::write(out, toml).map_err(CliError::io(out))?;
        println!("\nSaved map to {}", out.display());
    } else {
        println!("\n--- TOML Output ---\n");
        println!("{}", toml);
    }

    Ok(())
}

/// Describe the sector geometry of a region, e.g. "4 x 16 KiB + 1 x 64 KiB"
fn geometry(region: &RegionDescriptor) -> String {
    region
        .runs()
        .iter()
        .map(|r| format!("{} x {}", r.count, format_size(r.size)))
        .collect::<Vec<_>>()
        .join(" + ")
}

/// Print map information
pub fn print_map(map: &FlashMap, name: Option<&str>) {
    println!("Flash Map");
    println!("=========");

    if let Some(name) = name {
        println!("Name:   {}", name);
    }
    println!("Source: {}", map.source());

    println!("\nDevices ({}):", map.registry().len());
    println!(
        "{:<6} {:>12} {:>10} {:>10} {:>8}",
        "Id", "Base", "Write", "Erase", "Erased"
    );
    println!("{:-<50}", "");
    for device in map.registry().iter() {
        let base = device
            .base
            .map(|b| format!("{:#010X}", b))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:>12} {:>10} {:>10} {:>#8X}",
            device.id.to_string(),
            base,
            format_size(device.write_align),
            format_size(device.erase_align),
            device.erased_val
        );
    }

    println!("\nRegions ({}):", map.table().len());
    println!(
        "{:<6} {:<6} {:>10} {:>10} {:<24} {}",
        "Id", "Device", "Offset", "Size", "Sectors", "Slot"
    );
    println!("{:-<80}", "");
    for region in map.table().iter() {
        let slot = map
            .slots()
            .slot_of(region.id)
            .map(|key| key.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<6} {:#010X} {:>10} {:<24} {}",
            region.id.to_string(),
            region.device.to_string(),
            region.offset,
            format_size(region.size),
            geometry(region),
            slot
        );
    }

    if !map.slots().is_empty() {
        println!(
            "\nSlots ({} over {} images):",
            map.slots().len(),
            map.slots().image_count()
        );
        for slot in map.slots().iter() {
            println!("  {:<28} -> region {}", slot.key.to_string(), slot.region);
        }
    }
}
