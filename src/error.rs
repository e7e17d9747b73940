//! Unified error types for Watchkeep

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Watchkeep operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    // Application lookup errors
    #[error("Application '{0}' is not configured")]
    ApplicationNotFound(String),

    // Engine errors
    #[error("Monitoring engine is no longer running")]
    EngineStopped,

    // Autostart errors
    #[error("Autostart entry update failed: {0}")]
    Autostart(String),
}

/// Result type alias for Watchkeep operations
pub type Result<T> = std::result::Result<T, Error>;
