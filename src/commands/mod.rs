//! CLI command implementations
//!
//! Every command loads a map, either from a TOML map file or from a
//! flash-resident map inside a flash image, and validates it with
//! [`FlashMap::init`] before doing anything else.

pub mod map;
pub mod query;

use crate::error::{CliError, Result};
use flashmap_core::{FlashMap, TomlLayout};
use std::fs;
use std::path::Path;

/// Load and validate a TOML map file
///
/// Returns the map and its name from the `[map]` table.
pub fn load_map(path: &Path) -> Result<(FlashMap, Option<String>)> {
    let content = fs::read_to_string(path).map_err(CliError::io(path))?;
    let mut provider = TomlLayout::new(content);
    let map = FlashMap::init(&mut provider)?;
    log::debug!("Loaded map {}", path.display());
    Ok((map, provider.name().map(str::to_string)))
}

/// Format a size as human-readable string
pub fn format_size(bytes: u32) -> String {
    if bytes >= 1024 * 1024 && bytes.is_multiple_of(1024 * 1024) {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 && bytes.is_multiple_of(1024) {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
