//! Playback context
//!
//! **Responsibilities:**
//! - Backend detection (once, at construction)
//! - Master volume and mute
//! - Device power management ([`power`]: idle suspend, resume)
//! - Gesture unlock handshake ([`unlock`])
//! - Streaming element pool, voice id counter, codec cache, buffer cache
//! - Registry of live sounds
//!
//! One context is created explicitly and passed to every [`Sound`]. It is a
//! cheap handle (`Clone`) around shared state.
//!
//! # Locking
//!
//! Sounds may take the context lock while holding their own. The context
//! never calls into a sound while holding its lock: it snapshots the registry
//! first, and defers anything triggered from inside a sound call to a task.

mod element_pool;
mod power;
mod unlock;

pub use unlock::Gesture;

use crate::backend::{AudioGraph, BackendKind, DeviceState, GainNode, MediaElement, Platform};
use crate::cache::BufferCache;
use crate::config::ContextConfig;
use crate::error::{Error, Result};
use crate::events::EventDispatcher;
use crate::sound::{Sound, SoundInner, SoundKey};
use crate::timer::Timer;
use crate::voice::VoiceId;
use element_pool::ElementPool;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use unlock::UnlockState;

/// Voice ids are handed out above this value
const VOICE_ID_BASE: u64 = 1000;

/// Open graph device plus its master gain
#[derive(Clone)]
pub(crate) struct GraphOutput {
    pub(crate) device: Arc<dyn AudioGraph>,
    pub(crate) master: Arc<dyn GainNode>,
}

pub(crate) struct ContextState {
    pub(super) volume: f32,
    pub(super) muted: bool,
    pub(super) graph: Option<GraphOutput>,
    pub(super) device_state: DeviceState,
    pub(super) resume_after_suspend: bool,
    pub(super) resuming: bool,
    pub(super) suspend_timer: Option<Timer>,
    pub(super) suspend_seq: u64,
    pub(super) unlock: UnlockState,
    pub(super) elements: ElementPool,
    codecs: HashMap<String, bool>,
    sounds: Vec<(SoundKey, Weak<SoundInner>)>,
}

impl ContextState {
    /// Upgrade the registry, pruning dead entries
    pub(super) fn live_sounds(&mut self) -> Vec<Arc<SoundInner>> {
        self.sounds.retain(|(_, weak)| weak.strong_count() > 0);
        self.sounds.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
    }
}

pub(crate) struct ContextInner {
    config: ContextConfig,
    platform: Platform,
    runtime: Handle,
    state: Mutex<ContextState>,
    next_voice_id: AtomicU64,
    next_sound_key: AtomicU64,
    cache: BufferCache,
    dispatcher: EventDispatcher,
}

/// Shared playback context
#[derive(Clone)]
pub struct PlaybackContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for PlaybackContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackContext")
            .field("backend", &self.backend())
            .field("state", &self.state())
            .field("volume", &self.volume())
            .field("muted", &self.muted())
            .finish()
    }
}

/// Open a device and its master gain; `None` when the graph is unusable
fn open_graph(platform: &Platform, volume: f32, muted: bool) -> Option<GraphOutput> {
    match platform.graph.open() {
        Ok(device) => {
            let master = device.create_gain(None);
            master.set_value_at_time(if muted { 0.0 } else { volume }, device.current_time());
            Some(GraphOutput { device, master })
        }
        Err(e) => {
            warn!("Graph backend unavailable ({}), using streaming backend", e);
            None
        }
    }
}

impl PlaybackContext {
    /// Create a context on `platform`
    ///
    /// Must be called from within a tokio runtime; timers and backend
    /// completions run on it.
    pub fn new(platform: Platform, config: ContextConfig) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("playback context needs a tokio runtime: {}", e)))?;

        let graph = if config.force_streaming {
            info!("Graph backend disabled by configuration");
            None
        } else {
            open_graph(&platform, config.volume, false)
        };

        let state = ContextState {
            volume: config.volume,
            muted: false,
            graph,
            device_state: DeviceState::Running,
            resume_after_suspend: false,
            resuming: false,
            suspend_timer: None,
            suspend_seq: 0,
            unlock: UnlockState::default(),
            elements: ElementPool::new(config.html5_pool_size),
            codecs: HashMap::new(),
            sounds: Vec::new(),
        };

        let dispatcher = EventDispatcher::spawn(&runtime);
        let ctx = Self {
            inner: Arc::new(ContextInner {
                config,
                platform,
                runtime,
                state: Mutex::new(state),
                next_voice_id: AtomicU64::new(VOICE_ID_BASE),
                next_sound_key: AtomicU64::new(0),
                cache: BufferCache::new(),
                dispatcher,
            }),
        };
        info!(
            "Playback context created (backend: {}, volume: {:.2})",
            ctx.backend(),
            ctx.volume()
        );
        Ok(ctx)
    }

    // ========================================
    // Public surface
    // ========================================

    /// Master volume
    pub fn volume(&self) -> f32 {
        self.inner.state.lock().volume
    }

    /// Set master volume [0.0, 1.0]
    ///
    /// While muted the value is only stored. Otherwise the master gain is
    /// updated and every streaming voice's element volume becomes
    /// `voice volume × master volume`.
    pub fn set_volume(&self, volume: f32) {
        if !(0.0..=1.0).contains(&volume) {
            warn!("Ignoring master volume {} outside [0.0, 1.0]", volume);
            return;
        }
        let sounds = {
            let mut st = self.inner.state.lock();
            st.volume = volume;
            if st.muted {
                return;
            }
            if let Some(graph) = &st.graph {
                graph
                    .master
                    .set_value_at_time(volume, graph.device.current_time());
            }
            st.live_sounds()
        };
        for sound in sounds {
            sound.apply_context_volume(volume);
        }
    }

    /// Master mute
    pub fn muted(&self) -> bool {
        self.inner.state.lock().muted
    }

    /// Mute or unmute everything
    ///
    /// Streaming elements get `muted = master muted || voice muted`, so
    /// unmuting restores each voice's own mute flag.
    pub fn set_muted(&self, muted: bool) {
        let sounds = {
            let mut st = self.inner.state.lock();
            st.muted = muted;
            if let Some(graph) = &st.graph {
                let value = if muted { 0.0 } else { st.volume };
                graph
                    .master
                    .set_value_at_time(value, graph.device.current_time());
            }
            st.live_sounds()
        };
        for sound in sounds {
            sound.apply_context_mute(muted);
        }
    }

    /// Stop every voice of every sound
    pub fn stop(&self) {
        for sound in self.live_sounds() {
            Sound::from_inner(sound).stop();
        }
    }

    /// Unload every sound, clear the buffer cache and recreate the device
    pub fn unload(&self) {
        for sound in self.live_sounds() {
            Sound::from_inner(sound).unload();
        }
        self.inner.cache.clear();

        let mut st = self.inner.state.lock();
        st.suspend_timer = None;
        st.suspend_seq += 1;
        st.resume_after_suspend = false;
        if let Some(old) = st.graph.take() {
            self.inner.runtime.spawn(async move {
                if let Err(e) = old.device.close().await {
                    warn!("Failed to close audio device: {}", e);
                }
            });
            st.graph = open_graph(&self.inner.platform, st.volume, st.muted);
            st.device_state = DeviceState::Running;
            info!("Audio device recreated");
        }
    }

    /// Whether the platform can play `ext` (probed once per extension)
    pub fn codecs(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        let mut st = self.inner.state.lock();
        if let Some(&supported) = st.codecs.get(&ext) {
            return supported;
        }
        let supported = self.inner.platform.codecs.can_play(&ext);
        debug!("Codec probe: {} -> {}", ext, supported);
        st.codecs.insert(ext, supported);
        supported
    }

    /// Device power state
    pub fn state(&self) -> DeviceState {
        let st = self.inner.state.lock();
        match &st.graph {
            Some(graph) if graph.device.state() == DeviceState::Interrupted => {
                DeviceState::Interrupted
            }
            _ => st.device_state,
        }
    }

    /// Backend new sounds play through
    pub fn backend(&self) -> BackendKind {
        if self.inner.state.lock().graph.is_some() {
            BackendKind::Graph
        } else {
            BackendKind::Streaming
        }
    }

    /// Configuration the context was created with
    pub fn config(&self) -> &ContextConfig {
        &self.inner.config
    }

    /// Shared decoded-buffer cache
    pub fn cache(&self) -> &BufferCache {
        &self.inner.cache
    }

    /// Live sounds
    pub fn sounds(&self) -> Vec<Sound> {
        self.live_sounds().into_iter().map(Sound::from_inner).collect()
    }

    /// Idle streaming elements in the pool
    pub fn pooled_elements(&self) -> usize {
        self.inner.state.lock().elements.len()
    }

    // ========================================
    // Crate internals
    // ========================================

    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    pub(crate) fn platform(&self) -> &Platform {
        &self.inner.platform
    }

    pub(crate) fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    pub(crate) fn next_voice_id(&self) -> VoiceId {
        VoiceId::new(self.inner.next_voice_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub(crate) fn next_sound_key(&self) -> SoundKey {
        SoundKey::new(self.inner.next_sound_key.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub(crate) fn graph_output(&self) -> Option<GraphOutput> {
        self.inner.state.lock().graph.clone()
    }

    /// Whether graph voices can start right away
    pub(crate) fn device_running(&self) -> bool {
        let st = self.inner.state.lock();
        match &st.graph {
            Some(graph) => {
                st.device_state == DeviceState::Running
                    && graph.device.state() != DeviceState::Interrupted
            }
            None => false,
        }
    }

    pub(crate) fn register(&self, key: SoundKey, sound: Weak<SoundInner>) {
        self.inner.state.lock().sounds.push((key, sound));
    }

    pub(crate) fn unregister(&self, key: SoundKey) {
        self.inner.state.lock().sounds.retain(|(k, _)| *k != key);
    }

    pub(crate) fn live_sounds(&self) -> Vec<Arc<SoundInner>> {
        self.inner.state.lock().live_sounds()
    }

    /// Element for a new streaming voice
    pub(crate) fn obtain_element(&self) -> Box<dyn MediaElement> {
        let mut st = self.inner.state.lock();
        let unlocked = st.unlock.unlocked;
        st.elements
            .obtain(self.inner.platform.media.as_ref(), unlocked)
    }

    /// Return an element from an evicted or unloaded voice
    pub(crate) fn release_element(&self, element: Box<dyn MediaElement>) {
        self.inner.state.lock().elements.release(element);
    }

    fn downgrade(&self) -> Weak<ContextInner> {
        Arc::downgrade(&self.inner)
    }

    fn from_weak(weak: &Weak<ContextInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VirtualPlatform;

    #[tokio::test]
    async fn test_graph_detected() {
        let platform = VirtualPlatform::new();
        let ctx = PlaybackContext::new(platform.platform(), ContextConfig::default()).unwrap();
        assert_eq!(ctx.backend(), BackendKind::Graph);
        assert_eq!(platform.graphs_opened(), 1);
        assert_eq!(platform.graph().unwrap().master_gain(), Some(1.0));
    }

    #[tokio::test]
    async fn test_falls_back_to_streaming_when_graph_unavailable() {
        let platform = VirtualPlatform::new();
        platform.set_graph_available(false);
        let ctx = PlaybackContext::new(platform.platform(), ContextConfig::default()).unwrap();
        assert_eq!(ctx.backend(), BackendKind::Streaming);

        // Detection is not repeated
        platform.set_graph_available(true);
        assert_eq!(ctx.backend(), BackendKind::Streaming);
    }

    #[tokio::test]
    async fn test_codec_probe_is_cached() {
        let platform = VirtualPlatform::new();
        let ctx = PlaybackContext::new(platform.platform(), ContextConfig::default()).unwrap();

        assert!(ctx.codecs("mp3"));
        assert!(ctx.codecs(".MP3"));
        assert!(!ctx.codecs("xyz"));
        assert_eq!(platform.codec_queries(), 2);
    }

    #[tokio::test]
    async fn test_voice_ids_increase() {
        let platform = VirtualPlatform::new();
        let ctx = PlaybackContext::new(platform.platform(), ContextConfig::default()).unwrap();
        let a = ctx.next_voice_id();
        let b = ctx.next_voice_id();
        assert_eq!(a.get(), 1001);
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_master_volume_and_mute() {
        let platform = VirtualPlatform::new();
        let ctx = PlaybackContext::new(platform.platform(), ContextConfig::default()).unwrap();
        let graph = platform.graph().unwrap();

        ctx.set_volume(0.4);
        assert_eq!(graph.master_gain(), Some(0.4));

        ctx.set_muted(true);
        assert_eq!(graph.master_gain(), Some(0.0));

        // Stored but not applied while muted
        ctx.set_volume(0.7);
        assert_eq!(graph.master_gain(), Some(0.0));
        assert_eq!(ctx.volume(), 0.7);

        ctx.set_muted(false);
        assert_eq!(graph.master_gain(), Some(0.7));

        ctx.set_volume(1.5);
        assert_eq!(ctx.volume(), 0.7);
    }

    #[test]
    fn test_requires_runtime() {
        let platform = VirtualPlatform::new();
        let result = PlaybackContext::new(platform.platform(), ContextConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
