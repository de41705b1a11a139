//! CLI argument parsing

use clap::{Parser, Subcommand};
use flashmap_core::SlotRole;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a slot role by name or ordinal (0 primary, 1 secondary, 2 scratch)
fn parse_role(s: &str) -> Result<SlotRole, String> {
    s.parse::<u8>()
        .ok()
        .and_then(SlotRole::from_index)
        .or_else(|| SlotRole::from_name(s))
        .ok_or_else(|| format!("Invalid slot role '{}' (primary, secondary, scratch)", s))
}

#[derive(Parser)]
#[command(name = "flashmap")]
#[command(author, version, about = "Inspect and convert flash area maps", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show devices, regions and slots of a map file
    Show {
        /// Map file (TOML format)
        map: PathBuf,
    },

    /// Validate a map file
    Check {
        /// Map file (TOML format)
        map: PathBuf,
    },

    /// Resolve an image slot to its region
    Slot {
        /// Map file (TOML format)
        map: PathBuf,

        /// Slot role (primary, secondary, scratch or 0-2)
        #[arg(value_parser = parse_role)]
        role: SlotRole,

        /// Image index
        #[arg(short, long, default_value_t = 0)]
        image: u8,
    },

    /// Find the sector containing a region offset
    Sector {
        /// Map file (TOML format)
        map: PathBuf,

        /// Region id
        region: u8,

        /// Region-relative offset (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_hex_u32)]
        offset: u32,
    },

    /// Write the flash-resident binary form of a map file
    Export {
        /// Map file (TOML format)
        map: PathBuf,

        /// Output file
        output: PathBuf,
    },

    /// Extract a flash-resident map from a flash image
    Import {
        /// Flash image file
        image: PathBuf,

        /// Offset of the map in the image (hex with 0x prefix, or decimal)
        #[arg(long, default_value = "0", value_parser = parse_hex_u32)]
        offset: u32,

        /// Save the map as TOML instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
