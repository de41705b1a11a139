//! Error types for the flashmap CLI

use flashmap_core::DriverError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// CLI errors
#[derive(Debug, Error)]
pub enum CliError {
    /// File could not be read or written
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Map failed to load or validate, or a query failed
    #[error(transparent)]
    Map(#[from] flashmap_core::Error),

    /// No map signature at the given image offset
    #[error("No flash map found at offset {0:#x}")]
    NoMap(u32),

    /// Emulated flash rejected the image
    #[error("Emulated flash: {0}")]
    Sim(DriverError),
}

impl CliError {
    /// Wrap an I/O error with the path it concerns
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Result type for CLI commands
pub type Result<T> = std::result::Result<T, CliError>;
