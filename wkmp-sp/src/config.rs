//! Playback context configuration
//!
//! Loaded from TOML. Every field has a built-in default, so an empty (or
//! missing) file yields a working configuration.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`WKMP_SP_CONFIG`)
//! 3. `<platform config dir>/wkmp/sp.toml`
//! 4. Built-in defaults

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use wkmp_common::config::ConfigResolver;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "WKMP_SP_CONFIG";

/// Config file name under the platform config directory
pub const CONFIG_FILE_NAME: &str = "sp.toml";

/// Playback context settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Streaming elements kept unlocked and ready for reuse
    pub html5_pool_size: usize,

    /// Suspend the graph device after a period with no active voice
    pub auto_suspend: bool,

    /// Idle window before suspension (milliseconds)
    pub auto_suspend_delay_ms: u64,

    /// Arm the gesture unlock handshake when the first sound is created
    pub auto_unlock: bool,

    /// Expected output rate; any other rate on first unlock recreates the
    /// device once. `0` disables the check.
    pub expected_sample_rate: u32,

    /// Initial master volume [0.0, 1.0]
    pub volume: f32,

    /// Skip graph detection and use the streaming backend
    pub force_streaming: bool,

    /// Buffered events per sound subscription channel
    pub event_capacity: usize,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            html5_pool_size: 10,
            auto_suspend: true,
            auto_suspend_delay_ms: 30_000,
            auto_unlock: true,
            expected_sample_rate: 44_100,
            volume: 1.0,
            force_streaming: false,
            event_capacity: wkmp_common::events::DEFAULT_EVENT_CAPACITY,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ContextConfig {
    /// Resolve and load the config file, falling back to defaults
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        let config: Self = ConfigResolver::new(CONFIG_ENV_VAR, CONFIG_FILE_NAME).load(cli_arg)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(Error::Config(format!(
                "volume must be within [0.0, 1.0], got {}",
                self.volume
            )));
        }
        if self.html5_pool_size == 0 {
            return Err(Error::Config("html5_pool_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Idle window before auto-suspension
    pub fn auto_suspend_delay(&self) -> Duration {
        Duration::from_millis(self.auto_suspend_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = ContextConfig::default();
        assert_eq!(config.html5_pool_size, 10);
        assert_eq!(config.auto_suspend_delay(), Duration::from_secs(30));
        assert_eq!(config.expected_sample_rate, 44_100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ContextConfig = toml::from_str(
            r#"
            auto_suspend = false
            volume = 0.5

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert!(!config.auto_suspend);
        assert_eq!(config.volume, 0.5);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.html5_pool_size, 10);
    }

    #[test]
    fn test_validate_rejects_out_of_range_volume() {
        let config = ContextConfig {
            volume: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_env_var_names_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("from_env.toml");
        std::fs::write(&path, "volume = 0.25\nauto_unlock = false\n").unwrap();

        std::env::set_var(CONFIG_ENV_VAR, &path);
        let config = ContextConfig::load(None);
        std::env::remove_var(CONFIG_ENV_VAR);

        let config = config.unwrap();
        assert_eq!(config.volume, 0.25);
        assert!(!config.auto_unlock);
    }

    #[test]
    #[serial]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sp.toml");
        std::fs::write(&path, "volume = [not toml").unwrap();

        assert!(matches!(
            ContextConfig::load(Some(&path)),
            Err(Error::Common(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sp.toml");
        std::fs::write(&path, "html5_pool_size = 4\n").unwrap();

        let config = ContextConfig::load(Some(&path)).unwrap();
        assert_eq!(config.html5_pool_size, 4);
    }
}
