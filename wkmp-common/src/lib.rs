//! # WKMP Common Library
//!
//! Shared code for the WKMP sound player crates:
//! - Common error type
//! - Generic broadcast `EventBus`
//! - Configuration file discovery and TOML loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::EventBus;
