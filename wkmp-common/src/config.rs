//! Configuration file discovery and TOML loading
//!
//! Config file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/wkmp/<file_name>`)
//! 4. None: caller falls back to built-in defaults
//!
//! A missing configuration file is never fatal: the loader warns and returns
//! the type's defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolves which TOML file (if any) configures a WKMP component
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    env_var_name: String,
    file_name: String,
}

impl ConfigResolver {
    /// Create a resolver for a component
    ///
    /// # Arguments
    ///
    /// * `env_var_name` - Environment variable holding an explicit config path
    /// * `file_name` - File name looked up in the platform config directory
    pub fn new(env_var_name: &str, file_name: &str) -> Self {
        Self {
            env_var_name: env_var_name.to_string(),
            file_name: file_name.to_string(),
        }
    }

    /// Resolve the configuration file path
    ///
    /// Returns `None` when no source names a file and the platform default
    /// does not exist.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(&self.env_var_name) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config directory
        let default = self.default_path()?;
        if default.exists() {
            Some(default)
        } else {
            None
        }
    }

    /// Platform-specific default location (may not exist)
    pub fn default_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("wkmp").join(&self.file_name))
    }

    /// Resolve and load a configuration value
    ///
    /// Missing files yield `T::default()` with a warning; unreadable or
    /// malformed files are errors.
    pub fn load<T>(&self, cli_arg: Option<&Path>) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.resolve(cli_arg) {
            Some(path) => load_toml_or_default(&path),
            None => {
                debug!("No config file found for {}, using defaults", self.file_name);
                Ok(T::default())
            }
        }
    }
}

/// Parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|source| Error::Toml {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a TOML file into `T`, falling back to defaults when it is absent
pub fn load_toml_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        warn!("Config file {:?} not found, using built-in defaults", path);
        return Ok(T::default());
    }
    load_toml(path)
}
