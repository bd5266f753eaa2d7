use std::path::PathBuf;

use courier_shared::DecodeError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Generic I/O error (reading, writing or listing entity files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An entity file could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A write was requested before any exchange directory was configured.
    #[error("No exchange directory configured")]
    NoExchangeDirectory,

    /// The path is not a readable and writable directory.
    #[error("Invalid exchange directory: {}", .0.display())]
    InvalidDirectory(PathBuf),

    /// The OS file watcher could not be created or attached.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
