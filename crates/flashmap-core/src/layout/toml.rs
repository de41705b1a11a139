//! TOML map file parsing
//!
//! Parses map files in TOML format:
//!
//! ```toml
//! [map]
//! name = "board"
//!
//! [[device]]
//! id = 0
//! base = 0x08000000
//! write_align = 8
//! erase_align = "16 KiB"
//!
//! [[region]]
//! id = 1
//! device = 0
//! offset = 0x20000
//! size = "128 KiB"
//! sectors = [{ size = "16 KiB", count = 4 }, { size = "64 KiB", count = 1 }]
//!
//! [[slot]]
//! image = 0
//! role = "primary"
//! region = 1
//! ```
//!
//! A `[slot_convention]` table with `first_region`, `images` and `roles` may
//! replace the `[[slot]]` entries.

use std::fs;
use std::path::Path;
use std::string::String;
use std::vec::Vec;
use std::{format, vec};

use super::{
    FlashLayout, LayoutError, LayoutProvider, LayoutSource, RegionDescriptor, RegionId, SectorRun,
    MAX_SECTOR_RUNS,
};
use crate::device::{DeviceDescriptor, DeviceId, DEFAULT_ERASED_VALUE};
use crate::error::Result;
use crate::map::FlashMap;
use crate::slot::{ImageIndex, SlotAssignment, SlotRole};

/// TOML map file structure
#[derive(Debug, serde::Deserialize)]
struct TomlMapFile {
    map: Option<TomlMapMeta>,
    #[serde(default)]
    device: Vec<TomlDevice>,
    #[serde(default)]
    region: Vec<TomlRegion>,
    #[serde(default)]
    slot: Vec<TomlSlot>,
    slot_convention: Option<TomlSlotConvention>,
}

/// Map metadata
#[derive(Debug, serde::Deserialize)]
struct TomlMapMeta {
    name: Option<String>,
}

/// Device definition in TOML
#[derive(Debug, serde::Deserialize)]
struct TomlDevice {
    id: DeviceId,
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    base: Option<u32>,
    #[serde(deserialize_with = "deserialize_size")]
    write_align: u32,
    #[serde(deserialize_with = "deserialize_size")]
    erase_align: u32,
    #[serde(default = "default_erased_val")]
    erased_val: u8,
}

/// Region definition in TOML
#[derive(Debug, serde::Deserialize)]
struct TomlRegion {
    id: RegionId,
    device: DeviceId,
    #[serde(deserialize_with = "deserialize_size")]
    offset: u32,
    #[serde(deserialize_with = "deserialize_size")]
    size: u32,
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    sector_size: Option<u32>,
    sectors: Option<Vec<TomlRun>>,
}

/// Sector run in TOML
#[derive(Debug, serde::Deserialize)]
struct TomlRun {
    #[serde(deserialize_with = "deserialize_size")]
    size: u32,
    count: u32,
}

/// Explicit slot assignment in TOML
#[derive(Debug, serde::Deserialize)]
struct TomlSlot {
    #[serde(default)]
    image: ImageIndex,
    role: SlotRole,
    region: RegionId,
}

/// Conventional slot numbering in TOML
#[derive(Debug, serde::Deserialize)]
struct TomlSlotConvention {
    first_region: RegionId,
    #[serde(default = "default_images")]
    images: u8,
    roles: Vec<SlotRole>,
}

fn default_erased_val() -> u8 {
    DEFAULT_ERASED_VALUE
}

fn default_images() -> u8 {
    1
}

/// Deserialize a u32 given as an integer or as a hex/size string
fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeOrInt {
        Int(u32),
        Str(String),
    }

    match SizeOrInt::deserialize(deserializer)? {
        SizeOrInt::Int(n) => Ok(n),
        SizeOrInt::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

fn deserialize_opt_size<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_size(deserializer).map(Some)
}

/// Parse a number like "4096", "0x1000", "4 KiB" or "1MiB"
fn parse_size(s: &str) -> std::result::Result<u32, String> {
    let s = s.trim();

    if let Ok(n) = s.parse::<u32>() {
        return Ok(n);
    }

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u32::from_str_radix(hex.trim(), 16).map_err(|e| format!("invalid hex: {}", e));
    }

    let s_lower = s.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = s_lower.strip_suffix("mib") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = s_lower.strip_suffix("mb") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = s_lower.strip_suffix("kib") {
        (n.trim(), 1024)
    } else if let Some(n) = s_lower.strip_suffix("kb") {
        (n.trim(), 1024)
    } else if let Some(n) = s_lower.strip_suffix('b') {
        (n.trim(), 1)
    } else {
        return Err(format!("invalid size: {}", s));
    };

    let num: u32 = num_str.parse().map_err(|_| format!("invalid size: {}", s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflows 32 bits: {}", s))
}

/// Format a size as a string accepted by [`parse_size`]
fn format_size(size: u32) -> String {
    if size >= 1024 * 1024 && size.is_multiple_of(1024 * 1024) {
        format!("{} MiB", size / (1024 * 1024))
    } else if size >= 1024 && size.is_multiple_of(1024) {
        format!("{} KiB", size / 1024)
    } else {
        format!("{}", size)
    }
}

/// Map file in TOML format
#[derive(Debug, Clone)]
pub struct TomlLayout {
    content: String,
    name: Option<String>,
}

impl TomlLayout {
    /// Map from TOML text
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            name: None,
        }
    }

    /// Read a map file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            log::error!("Cannot read map file {}: {}", path.display(), e);
            LayoutError::IoError
        })?;
        Ok(Self::new(content))
    }

    /// Map name from the `[map]` table, available after loading
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl LayoutProvider for TomlLayout {
    fn load(&mut self) -> Result<FlashLayout> {
        let file: TomlMapFile = toml::from_str(&self.content).map_err(|e| {
            log::error!("Invalid map file: {}", e);
            LayoutError::ParseError
        })?;

        let mut layout = FlashLayout::new(LayoutSource::File);
        self.name = file.map.and_then(|m| m.name);

        for dev in file.device {
            let device = match dev.base {
                Some(base) => DeviceDescriptor::memory_mapped(
                    dev.id,
                    base as usize,
                    dev.write_align,
                    dev.erase_align,
                ),
                None => DeviceDescriptor::new(dev.id, dev.write_align, dev.erase_align),
            };
            layout.add_device(device.with_erased_val(dev.erased_val))?;
        }

        for reg in file.region {
            let runs = match (reg.sector_size, reg.sectors) {
                (Some(sector_size), None) => {
                    let count = if sector_size == 0 { 0 } else { reg.size / sector_size };
                    vec![SectorRun::new(sector_size, count)]
                }
                (None, Some(runs)) => {
                    if runs.len() > MAX_SECTOR_RUNS {
                        return Err(LayoutError::TooManyRuns(reg.id).into());
                    }
                    runs.iter()
                        .map(|r| SectorRun::new(r.size, r.count))
                        .collect()
                }
                _ => {
                    log::error!(
                        "Region {} needs exactly one of sector_size or sectors",
                        reg.id
                    );
                    return Err(LayoutError::ParseError.into());
                }
            };
            layout.add_region(RegionDescriptor::with_runs(
                reg.id, reg.device, reg.offset, reg.size, &runs,
            ))?;
        }

        match file.slot_convention {
            Some(_) if !file.slot.is_empty() => {
                return Err(LayoutError::ConflictingSlotSources.into());
            }
            Some(conv) => {
                layout.set_slot_convention(conv.first_region, conv.images, &conv.roles)?
            }
            None => {
                for slot in file.slot {
                    layout.add_slot(SlotAssignment::new(slot.image, slot.role, slot.region))?;
                }
            }
        }

        Ok(layout)
    }
}

/// Render a map in TOML format
///
/// Slots are written as explicit `[[slot]]` entries.
///
/// # Errors
/// * `BaseOutOfRange` - A device base address needs more than 32 bits
pub fn to_toml_string(map: &FlashMap, name: Option<&str>) -> Result<String> {
    let mut output = String::new();

    if let Some(name) = name {
        output.push_str("[map]\n");
        output.push_str(&format!("name = {}\n\n", toml::Value::from(name)));
    }

    for device in map.registry().iter() {
        output.push_str("[[device]]\n");
        output.push_str(&format!("id = {}\n", device.id.0));
        if let Some(base) = device.base {
            let base = u32::try_from(base).map_err(|_| LayoutError::BaseOutOfRange(device.id))?;
            output.push_str(&format!("base = 0x{:08X}\n", base));
        }
        output.push_str(&format!("write_align = {}\n", device.write_align));
        output.push_str(&format!(
            "erase_align = \"{}\"\n",
            format_size(device.erase_align)
        ));
        if device.erased_val != DEFAULT_ERASED_VALUE {
            output.push_str(&format!("erased_val = 0x{:02X}\n", device.erased_val));
        }
        output.push('\n');
    }

    for region in map.table().iter() {
        output.push_str("[[region]]\n");
        output.push_str(&format!("id = {}\n", region.id));
        output.push_str(&format!("device = {}\n", region.device.0));
        output.push_str(&format!("offset = 0x{:08X}\n", region.offset));
        output.push_str(&format!("size = \"{}\"\n", format_size(region.size)));
        match region.runs() {
            [run] => {
                output.push_str(&format!("sector_size = \"{}\"\n", format_size(run.size)));
            }
            runs => {
                let runs: Vec<String> = runs
                    .iter()
                    .map(|r| {
                        format!(
                            "{{ size = \"{}\", count = {} }}",
                            format_size(r.size),
                            r.count
                        )
                    })
                    .collect();
                output.push_str(&format!("sectors = [{}]\n", runs.join(", ")));
            }
        }
        output.push('\n');
    }

    for slot in map.slots().iter() {
        output.push_str("[[slot]]\n");
        output.push_str(&format!("image = {}\n", slot.key.image));
        output.push_str(&format!("role = \"{}\"\n", slot.key.role));
        output.push_str(&format!("region = {}\n", slot.region));
        output.push('\n');
    }

    Ok(output)
}
