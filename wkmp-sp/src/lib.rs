//! # WKMP Sound Player Library (wkmp-sp)
//!
//! Sound playback engine: load audio assets, play any number of overlapping
//! voices of each, and control volume, mute, fades, looping, rate, seeking
//! and named sprites per voice or per sound.
//!
//! **Architecture:** one [`PlaybackContext`] owns the output (master gain,
//! device power state, gesture unlock, decoded-buffer cache, element pool).
//! Each [`Sound`] is one asset with a pool of voices. Every voice plays
//! through one of two backends:
//!
//! - **graph**: decoded buffers played through gain nodes routed into the
//!   master gain (sample-accurate, needs the whole file decoded)
//! - **streaming**: one media element per voice (large files, live streams)
//!
//! Platform access goes through the traits in [`backend`]; the headless
//! [`backend::VirtualPlatform`] implements all of them.
//!
//! ```no_run
//! # async fn demo() -> wkmp_sp::Result<()> {
//! use wkmp_sp::backend::VirtualPlatform;
//! use wkmp_sp::{ContextConfig, PlaybackContext, Sound, SoundDescriptor, Sprite};
//!
//! let platform = VirtualPlatform::new();
//! platform.add_clip("sfx.mp3", 3.0);
//! let ctx = PlaybackContext::new(platform.platform(), ContextConfig::default())?;
//!
//! let sfx = Sound::new(&ctx, SoundDescriptor::new(["sfx.mp3"]).sprite("hit", Sprite::new(0.0, 500.0)))?;
//! let voice = sfx.play_sprite("hit");
//! # let _ = voice;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod fade;
pub mod sound;
pub mod timer;
pub mod voice;

pub use backend::{BackendKind, DeviceState, Platform, Preload};
pub use config::ContextConfig;
pub use context::{Gesture, PlaybackContext};
pub use error::{BackendError, Error, LoadError, PlayError, Result};
pub use events::{EventKind, ListenerId, SoundEvent};
pub use sound::{Command, LoadState, Sound, SoundDescriptor, SoundKey, Sprite};
pub use voice::VoiceId;
