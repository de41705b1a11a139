//! flashmap - Inspect and convert flash area maps
//!
//! Board bring-up companion to `flashmap-core`. It validates TOML map files
//! exactly as firmware would at boot, answers slot and sector queries, and
//! converts between the TOML and flash-resident binary forms of a map.

mod cli;
mod commands;
mod error;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let result = match cli.command {
        Commands::Show { map } => commands::map::cmd_show(&map),
        Commands::Check { map } => commands::map::cmd_check(&map),
        Commands::Slot { map, role, image } => commands::query::cmd_slot(&map, role, image),
        Commands::Sector {
            map,
            region,
            offset,
        } => commands::query::cmd_sector(&map, region, offset),
        Commands::Export { map, output } => commands::map::cmd_export(&map, &output),
        Commands::Import {
            image,
            offset,
            output,
        } => commands::map::cmd_import(&image, offset, output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
