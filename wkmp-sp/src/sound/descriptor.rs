//! Sound construction input
//!
//! A [`SoundDescriptor`] lists candidate sources and initial parameters.
//! It deserializes from TOML/JSON; listener callbacks can only be attached
//! in code through the builder.
//!
//! ```toml
//! src = ["sfx.webm", "sfx.mp3"]
//! volume = 0.8
//!
//! [sprite]
//! hit = [0, 500]
//! hum = [1000, 2500, true]
//! ```

use crate::backend::{FetchOptions, Preload};
use crate::events::{Callback, EventKind, SoundEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default voice pool limit per sound
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Named sub-range of a clip
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "SpriteRepr", into = "SpriteRepr")]
pub struct Sprite {
    /// Offset from the clip start (milliseconds)
    pub offset_ms: f64,
    /// Length (milliseconds)
    pub duration_ms: f64,
    /// Restart from `offset_ms` when the end is reached
    pub looping: bool,
}

impl Sprite {
    /// Non-looping sprite
    pub fn new(offset_ms: f64, duration_ms: f64) -> Self {
        Self {
            offset_ms,
            duration_ms,
            looping: false,
        }
    }

    /// Looping sprite
    pub fn looping(offset_ms: f64, duration_ms: f64) -> Self {
        Self {
            offset_ms,
            duration_ms,
            looping: true,
        }
    }

    /// Start in seconds
    pub fn start(&self) -> f64 {
        self.offset_ms / 1000.0
    }

    /// End in seconds
    pub fn stop(&self) -> f64 {
        (self.offset_ms + self.duration_ms) / 1000.0
    }
}

/// Sprites are written as `[offset, duration]` or `[offset, duration, loop]`
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SpriteRepr {
    Looped(f64, f64, bool),
    Plain(f64, f64),
}

impl From<SpriteRepr> for Sprite {
    fn from(repr: SpriteRepr) -> Self {
        match repr {
            SpriteRepr::Plain(offset_ms, duration_ms) => Sprite::new(offset_ms, duration_ms),
            SpriteRepr::Looped(offset_ms, duration_ms, looping) => Sprite {
                offset_ms,
                duration_ms,
                looping,
            },
        }
    }
}

impl From<Sprite> for SpriteRepr {
    fn from(sprite: Sprite) -> Self {
        if sprite.looping {
            SpriteRepr::Looped(sprite.offset_ms, sprite.duration_ms, true)
        } else {
            SpriteRepr::Plain(sprite.offset_ms, sprite.duration_ms)
        }
    }
}

/// Everything needed to construct a sound
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundDescriptor {
    /// Candidate sources in preference order (paths, URLs or `data:` URIs)
    pub src: Vec<String>,
    /// Explicit extensions, positionally matching `src`
    pub format: Vec<String>,
    /// Queue a default `play` at construction
    pub autoplay: bool,
    /// Loop every voice
    #[serde(rename = "loop")]
    pub looping: bool,
    /// Start muted
    pub mute: bool,
    /// Initial volume [0.0, 1.0]
    pub volume: f32,
    /// Initial playback rate
    pub rate: f64,
    /// Inactive voices kept for reuse
    pub pool: usize,
    /// Buffering mode; `none` skips the automatic load
    pub preload: Preload,
    /// Force the streaming backend for this sound
    pub html5: bool,
    /// Named sprites
    pub sprite: BTreeMap<String, Sprite>,
    /// Request options for the fetcher
    pub xhr: FetchOptions,
    #[serde(skip)]
    pub(crate) listeners: Vec<(EventKind, Callback)>,
}

impl Default for SoundDescriptor {
    fn default() -> Self {
        Self {
            src: Vec::new(),
            format: Vec::new(),
            autoplay: false,
            looping: false,
            mute: false,
            volume: 1.0,
            rate: 1.0,
            pool: DEFAULT_POOL_SIZE,
            preload: Preload::Full,
            html5: false,
            sprite: BTreeMap::new(),
            xhr: FetchOptions::default(),
            listeners: Vec::new(),
        }
    }
}

impl std::fmt::Debug for SoundDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundDescriptor")
            .field("src", &self.src)
            .field("format", &self.format)
            .field("autoplay", &self.autoplay)
            .field("looping", &self.looping)
            .field("mute", &self.mute)
            .field("volume", &self.volume)
            .field("rate", &self.rate)
            .field("pool", &self.pool)
            .field("preload", &self.preload)
            .field("html5", &self.html5)
            .field("sprite", &self.sprite)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl SoundDescriptor {
    /// Descriptor for the given candidate sources
    pub fn new<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            src: sources.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Explicit extensions, one per source
    pub fn format<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.format = formats.into_iter().map(Into::into).collect();
        self
    }

    /// Add a sprite
    pub fn sprite(mut self, name: &str, sprite: Sprite) -> Self {
        self.sprite.insert(name.to_string(), sprite);
        self
    }

    pub fn autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn mute(mut self, muted: bool) -> Self {
        self.mute = muted;
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn pool(mut self, pool: usize) -> Self {
        self.pool = pool;
        self
    }

    pub fn preload(mut self, preload: Preload) -> Self {
        self.preload = preload;
        self
    }

    pub fn html5(mut self, html5: bool) -> Self {
        self.html5 = html5;
        self
    }

    pub fn fetch_options(mut self, options: FetchOptions) -> Self {
        self.xhr = options;
        self
    }

    /// Register a listener before the sound exists (e.g. `onload`)
    pub fn on<F>(mut self, kind: EventKind, callback: F) -> Self
    where
        F: Fn(&SoundEvent) + Send + Sync + 'static,
    {
        self.listeners.push((kind, Arc::new(callback)));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sprite_forms() {
        let desc: SoundDescriptor = toml::from_str(
            r#"
            src = ["sfx.mp3"]

            [sprite]
            hit = [0, 500]
            hum = [1000, 2500, true]
            "#,
        )
        .unwrap();

        assert_eq!(desc.sprite["hit"], Sprite::new(0.0, 500.0));
        assert_eq!(desc.sprite["hum"], Sprite::looping(1000.0, 2500.0));
        assert_eq!(desc.pool, DEFAULT_POOL_SIZE);
        assert_eq!(desc.volume, 1.0);
    }

    #[test]
    fn test_json_descriptor() {
        let desc: SoundDescriptor = serde_json::from_str(
            r#"{"src": ["a.webm", "a.mp3"], "loop": true, "preload": "metadata", "html5": true}"#,
        )
        .unwrap();

        assert!(desc.looping);
        assert!(desc.html5);
        assert_eq!(desc.preload, Preload::Metadata);
        assert_eq!(desc.src.len(), 2);
    }

    #[test]
    fn test_sprite_bounds() {
        let sprite = Sprite::new(250.0, 500.0);
        assert_eq!(sprite.start(), 0.25);
        assert_eq!(sprite.stop(), 0.75);
    }

    #[test]
    fn test_builder_collects_listeners() {
        let desc = SoundDescriptor::new(["a.mp3"])
            .on(EventKind::Load, |_| {})
            .on(EventKind::End, |_| {});
        assert_eq!(desc.listeners.len(), 2);
    }
}
