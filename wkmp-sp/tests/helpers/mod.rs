//! Test helper modules for wkmp-sp integration tests
//!
//! Provides reusable test infrastructure components:
//! - TestRig: virtual platform plus a playback context on it
//! - EventLog: records every event one sound emits
//!
//! All integration tests run on a paused tokio clock, so device time, element
//! latencies and end-of-clip timers advance only through `advance`.

#![allow(dead_code)]

use std::time::Duration;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;
use wkmp_sp::backend::VirtualPlatform;
use wkmp_sp::{ContextConfig, EventKind, PlaybackContext, Sound, SoundDescriptor, SoundEvent, VoiceId};

/// Virtual platform and the context running on it
pub struct TestRig {
    pub platform: VirtualPlatform,
    pub ctx: PlaybackContext,
}

impl TestRig {
    /// Graph-capable platform, default configuration
    pub fn new() -> Self {
        Self::with_config(VirtualPlatform::new(), ContextConfig::default())
    }

    /// Platform without a graph backend
    pub fn streaming() -> Self {
        let platform = VirtualPlatform::new();
        platform.set_graph_available(false);
        Self::with_config(platform, ContextConfig::default())
    }

    /// Explicit platform and configuration
    pub fn with_config(platform: VirtualPlatform, config: ContextConfig) -> Self {
        let ctx = PlaybackContext::new(platform.platform(), config)
            .expect("Failed to create playback context");
        Self { platform, ctx }
    }

    /// Register a clip and create a sound on it
    pub fn sound(&self, url: &str, duration: f64, descriptor: SoundDescriptor) -> (Sound, EventLog) {
        self.platform.add_clip(url, duration);
        let sound = Sound::new(&self.ctx, descriptor).expect("Failed to create sound");
        let log = EventLog::new(&sound);
        (sound, log)
    }

    /// Create a loaded sound, with an empty event log
    pub async fn loaded(&self, url: &str, duration: f64, descriptor: SoundDescriptor) -> (Sound, EventLog) {
        let (sound, mut log) = self.sound(url, duration, descriptor);
        advance(50).await;
        assert_eq!(log.count(EventKind::Load), 1, "sound should be loaded");
        log.clear();
        (sound, log)
    }
}

/// Recorder for one sound's event stream
pub struct EventLog {
    rx: Receiver<SoundEvent>,
    seen: Vec<SoundEvent>,
}

impl EventLog {
    pub fn new(sound: &Sound) -> Self {
        Self {
            rx: sound.subscribe(),
            seen: Vec::new(),
        }
    }

    fn pump(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(event) => self.seen.push(event),
                Err(TryRecvError::Lagged(missed)) => panic!("event log lagged by {}", missed),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    /// Every event so far
    pub fn events(&mut self) -> Vec<SoundEvent> {
        self.pump();
        self.seen.clone()
    }

    /// Event kinds so far, in emission order
    pub fn kinds(&mut self) -> Vec<EventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    /// Event kinds so far, ignoring `volume` noise
    pub fn transport(&mut self) -> Vec<EventKind> {
        self.kinds()
            .into_iter()
            .filter(|k| *k != EventKind::Volume)
            .collect()
    }

    pub fn count(&mut self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }

    pub fn count_for(&mut self, kind: EventKind, voice: VoiceId) -> usize {
        self.events()
            .iter()
            .filter(|e| e.kind == kind && e.voice == Some(voice))
            .count()
    }

    /// Last event of `kind`
    pub fn last(&mut self, kind: EventKind) -> Option<SoundEvent> {
        self.events().into_iter().rev().find(|e| e.kind == kind)
    }

    pub fn clear(&mut self) {
        self.pump();
        self.seen.clear();
    }
}

/// Advance the paused clock by `ms` milliseconds
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
