//! Common error types for WKMP

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for WKMP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across WKMP crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML document could not be parsed into the requested type
    #[error("Invalid TOML in {path:?}: {source}")]
    Toml {
        /// File that failed to parse
        path: PathBuf,
        /// Underlying parse error
        #[source]
        source: toml::de::Error,
    },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
