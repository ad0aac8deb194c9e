//! Sounds: loaded assets and their voices
//!
//! **Responsibilities:**
//! - Source resolution and asset loading ([`loader`])
//! - Voice allocation and the pool policy ([`playback`])
//! - Transport: play, pause, stop, end-of-clip handling ([`playback`])
//! - Parameters: volume, mute, fade, rate, loop, seek ([`params`])
//! - Deferring operations until loaded ([`queue`])
//! - Event emission
//!
//! # Architecture
//!
//! All mutable state sits behind one lock per sound. Every public method
//! takes the lock, runs the operation, then replays whatever queued commands
//! have become runnable before releasing it. Timer and backend completions
//! re-enter through the same path. Listener callbacks never run under the
//! lock: they are captured at emission and dispatched later.
//!
//! Operations called before the sound is ready (not loaded, or a start is
//! waiting on the backend) are recorded as [`Command`]s and replayed in issue
//! order. `play` is the exception: it reserves a voice and returns its id
//! immediately.

pub mod descriptor;
mod loader;
mod params;
mod playback;
pub mod queue;
pub mod source;

pub use descriptor::{SoundDescriptor, Sprite, DEFAULT_POOL_SIZE};
pub use queue::{ActionQueue, Command};
pub use source::ResolvedSource;

use crate::backend::{BackendKind, DecodedAudio, FetchOptions, Preload};
use crate::context::PlaybackContext;
use crate::error::{Error, Result};
use crate::events::{Callback, EventKind, ListenerId, Listeners, SoundEvent};
use crate::timer::Timer;
use crate::voice::{Voice, VoiceDefaults, VoiceId, VoiceNode};
use parking_lot::Mutex;
use playback::Target;
use queue::Completion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};
use wkmp_common::EventBus;

/// Identifies a sound within its context (carried by every event)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoundKey(u64);

impl SoundKey {
    /// Wrap a raw key
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw key
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SoundKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asset load state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    /// Not loaded (initial, after unload, after a failed load)
    Unloaded,
    /// Fetch/decode or element buffering in progress
    Loading,
    /// Playable
    Loaded,
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadState::Unloaded => write!(f, "unloaded"),
            LoadState::Loading => write!(f, "loading"),
            LoadState::Loaded => write!(f, "loaded"),
        }
    }
}

pub(crate) struct SoundState {
    sources: Vec<String>,
    formats: Vec<String>,
    src: Option<ResolvedSource>,
    sprites: BTreeMap<String, Sprite>,
    pool: usize,
    preload: Preload,
    fetch: FetchOptions,
    volume: f32,
    muted: bool,
    looping: bool,
    rate: f64,
    /// Clip duration in seconds (infinite for live streams)
    duration: f64,
    load_state: LoadState,
    backend: BackendKind,
    /// Streaming fallback already taken after a network failure
    fallback_used: bool,
    voices: Vec<Voice>,
    queue: ActionQueue<Command>,
    /// A start is waiting on the backend; other operations queue behind it
    play_lock: bool,
    listeners: Listeners,
    buffer: Option<Arc<DecodedAudio>>,
    /// Buffer-cache key this sound holds a reference to
    cache_key: Option<String>,
    /// Fences completions of superseded loads
    load_seq: u64,
    /// Listed in the context registry
    registered: bool,
    loader: Option<Timer>,
}

impl SoundState {
    fn defaults(&self) -> VoiceDefaults {
        VoiceDefaults {
            volume: self.volume,
            muted: self.muted,
            looping: self.looping,
            rate: self.rate,
        }
    }

    fn is_ready(&self) -> bool {
        self.load_state == LoadState::Loaded && !self.play_lock
    }

    fn voice_index(&self, id: VoiceId) -> Option<usize> {
        self.voices.iter().position(|v| v.id == id)
    }

    fn voice(&self, id: VoiceId) -> Option<&Voice> {
        self.voices.iter().find(|v| v.id == id)
    }

    /// Ids addressed by an optional voice argument
    fn target_ids(&self, target: Option<VoiceId>) -> Vec<VoiceId> {
        match target {
            Some(id) => vec![id],
            None => self.voices.iter().map(|v| v.id).collect(),
        }
    }
}

pub(crate) struct SoundInner {
    key: SoundKey,
    ctx: PlaybackContext,
    this: Weak<SoundInner>,
    bus: EventBus<SoundEvent>,
    state: Mutex<SoundState>,
}

/// A loaded (or loading) asset and its voices
///
/// Cheap to clone; clones address the same sound.
#[derive(Clone)]
pub struct Sound {
    inner: Arc<SoundInner>,
}

impl std::fmt::Debug for Sound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("Sound")
            .field("key", &self.inner.key)
            .field("state", &st.load_state)
            .field("backend", &st.backend)
            .field("voices", &st.voices.len())
            .finish()
    }
}

impl Sound {
    /// Create a sound in `ctx`
    ///
    /// Loading starts right away unless the descriptor's preload is `none`.
    /// Fails only on an invalid descriptor; load failures are reported as
    /// `loaderror` events.
    pub fn new(ctx: &PlaybackContext, descriptor: SoundDescriptor) -> Result<Sound> {
        if descriptor.src.is_empty() {
            error!("Rejected sound descriptor: no sources");
            return Err(Error::Config(
                "an array of source files must be passed with any new sound".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&descriptor.volume) {
            error!("Rejected sound descriptor: volume {} out of range", descriptor.volume);
            return Err(Error::Config(format!(
                "volume must be within [0.0, 1.0], got {}",
                descriptor.volume
            )));
        }
        if !descriptor.rate.is_finite() || descriptor.rate == 0.0 {
            error!("Rejected sound descriptor: invalid rate {}", descriptor.rate);
            return Err(Error::Config(format!("invalid playback rate {}", descriptor.rate)));
        }

        let backend = if descriptor.html5 {
            BackendKind::Streaming
        } else {
            ctx.backend()
        };
        let key = ctx.next_sound_key();

        let mut listeners = Listeners::default();
        for (kind, callback) in descriptor.listeners {
            listeners.add(kind, callback, None, false);
        }

        let state = SoundState {
            sources: descriptor.src,
            formats: descriptor.format,
            src: None,
            sprites: descriptor.sprite,
            pool: descriptor.pool,
            preload: descriptor.preload,
            fetch: descriptor.xhr,
            volume: descriptor.volume,
            muted: descriptor.mute,
            looping: descriptor.looping,
            rate: descriptor.rate,
            duration: 0.0,
            load_state: LoadState::Unloaded,
            backend,
            fallback_used: false,
            voices: Vec::new(),
            queue: ActionQueue::new(),
            play_lock: false,
            listeners,
            buffer: None,
            cache_key: None,
            load_seq: 0,
            registered: true,
            loader: None,
        };

        let inner = Arc::new_cyclic(|this| SoundInner {
            key,
            ctx: ctx.clone(),
            this: this.clone(),
            bus: EventBus::new(ctx.config().event_capacity),
            state: Mutex::new(state),
        });

        if ctx.config().auto_unlock {
            ctx.unlock();
        }
        ctx.register(key, Arc::downgrade(&inner));
        debug!("Sound {} created ({} backend)", key, backend);

        let sound = Sound { inner };
        if descriptor.autoplay {
            sound.play();
        }
        if descriptor.preload != Preload::None {
            sound.load();
        }
        Ok(sound)
    }

    pub(crate) fn from_inner(inner: Arc<SoundInner>) -> Self {
        Self { inner }
    }

    /// Key carried by this sound's events
    pub fn key(&self) -> SoundKey {
        self.inner.key
    }

    /// Owning context
    pub fn context(&self) -> &PlaybackContext {
        &self.inner.ctx
    }

    /// Backend this sound plays through
    pub fn backend(&self) -> BackendKind {
        self.inner.state.lock().backend
    }

    /// Load state
    pub fn state(&self) -> LoadState {
        self.inner.state.lock().load_state
    }

    /// Start loading (no-op while loading or loaded)
    pub fn load(&self) {
        self.inner.with_state(|inner, st| inner.load(st));
    }

    /// Source chosen by the last load
    pub fn source(&self) -> Option<ResolvedSource> {
        self.inner.state.lock().src.clone()
    }

    /// Ids of every voice, active or inactive
    pub fn voice_ids(&self) -> Vec<VoiceId> {
        self.inner.state.lock().voices.iter().map(|v| v.id).collect()
    }

    /// Commands waiting for the sound to become ready
    pub fn queued(&self) -> Vec<Command> {
        self.inner.state.lock().queue.commands()
    }

    /// Sprite names
    pub fn sprites(&self) -> Vec<String> {
        self.inner.state.lock().sprites.keys().cloned().collect()
    }

    // ========================================
    // Transport
    // ========================================

    /// Play the whole clip, or resume the single paused voice
    ///
    /// Returns the voice id, also when the start is deferred until load.
    pub fn play(&self) -> Option<VoiceId> {
        self.inner
            .with_state(|inner, st| inner.play_voice(st, Target::Default, false).0)
    }

    /// Play a named sprite on a fresh (or recycled) voice
    ///
    /// Returns `None` for an unknown sprite once loaded.
    pub fn play_sprite(&self, sprite: &str) -> Option<VoiceId> {
        let target = Target::Sprite(sprite.to_string());
        self.inner
            .with_state(|inner, st| inner.play_voice(st, target, false).0)
    }

    /// Resume (or restart) an existing voice
    pub fn play_voice(&self, id: VoiceId) -> Option<VoiceId> {
        self.inner
            .with_state(|inner, st| inner.play_voice(st, Target::Voice(id), false).0)
    }

    /// Pause every voice
    pub fn pause(&self) {
        self.inner.submit(Command::Pause { voice: None });
    }

    /// Pause one voice
    pub fn pause_voice(&self, id: VoiceId) {
        self.inner.submit(Command::Pause { voice: Some(id) });
    }

    /// Stop every voice (position back to the sprite start)
    pub fn stop(&self) {
        self.inner.submit(Command::Stop { voice: None });
    }

    /// Stop one voice
    pub fn stop_voice(&self, id: VoiceId) {
        self.inner.submit(Command::Stop { voice: Some(id) });
    }

    /// Whether any voice is playing
    pub fn playing(&self) -> bool {
        self.inner.state.lock().voices.iter().any(|v| !v.paused)
    }

    /// Whether one voice is playing
    pub fn voice_playing(&self, id: VoiceId) -> bool {
        self.inner
            .state
            .lock()
            .voice(id)
            .is_some_and(|v| !v.paused)
    }

    /// Clip duration in seconds (0 until loaded)
    pub fn duration(&self) -> f64 {
        self.inner.state.lock().duration
    }

    /// Duration of the sprite a voice plays
    pub fn voice_duration(&self, id: VoiceId) -> Option<f64> {
        let st = self.inner.state.lock();
        let voice = st.voice(id)?;
        st.sprites
            .get(&voice.sprite)
            .map(|s| s.duration_ms / 1000.0)
    }

    /// Stop everything, release backend resources and forget the asset
    pub fn unload(&self) {
        self.inner.unload();
    }

    // ========================================
    // Parameters
    // ========================================

    /// Group volume
    pub fn volume(&self) -> f32 {
        self.inner.state.lock().volume
    }

    /// Volume of one voice
    pub fn voice_volume(&self, id: VoiceId) -> Option<f32> {
        self.inner.state.lock().voice(id).map(|v| v.volume)
    }

    /// Set the group volume and every voice's volume
    pub fn set_volume(&self, volume: f32) {
        self.inner.submit_volume(volume, None);
    }

    /// Set one voice's volume
    pub fn set_voice_volume(&self, volume: f32, id: VoiceId) {
        self.inner.submit_volume(volume, Some(id));
    }

    /// Group mute
    pub fn muted(&self) -> bool {
        self.inner.state.lock().muted
    }

    /// Mute flag of one voice
    pub fn voice_muted(&self, id: VoiceId) -> Option<bool> {
        self.inner.state.lock().voice(id).map(|v| v.muted)
    }

    /// Mute or unmute every voice
    pub fn mute(&self, muted: bool) {
        self.inner.submit(Command::Mute { muted, voice: None });
    }

    /// Mute or unmute one voice
    pub fn mute_voice(&self, muted: bool, id: VoiceId) {
        self.inner.submit(Command::Mute {
            muted,
            voice: Some(id),
        });
    }

    /// Fade every voice from `from` to `to` over `len`
    pub fn fade(&self, from: f32, to: f32, len: Duration) {
        self.inner.submit(Command::Fade {
            from,
            to,
            len,
            voice: None,
        });
    }

    /// Fade one voice
    pub fn fade_voice(&self, from: f32, to: f32, len: Duration, id: VoiceId) {
        self.inner.submit(Command::Fade {
            from,
            to,
            len,
            voice: Some(id),
        });
    }

    /// Group loop flag
    pub fn looping(&self) -> bool {
        self.inner.state.lock().looping
    }

    /// Loop flag of one voice
    pub fn voice_looping(&self, id: VoiceId) -> Option<bool> {
        self.inner.state.lock().voice(id).map(|v| v.looping)
    }

    /// Loop every voice
    pub fn set_loop(&self, looping: bool) {
        self.inner.submit(Command::Loop {
            looping,
            voice: None,
        });
    }

    /// Loop one voice
    pub fn set_voice_loop(&self, looping: bool, id: VoiceId) {
        self.inner.submit(Command::Loop {
            looping,
            voice: Some(id),
        });
    }

    /// Group playback rate
    pub fn rate(&self) -> f64 {
        self.inner.state.lock().rate
    }

    /// Playback rate of one voice
    pub fn voice_rate(&self, id: VoiceId) -> Option<f64> {
        self.inner.state.lock().voice(id).map(|v| v.rate)
    }

    /// Set every voice's playback rate
    pub fn set_rate(&self, rate: f64) {
        self.inner.submit_rate(rate, None);
    }

    /// Set one voice's playback rate
    pub fn set_voice_rate(&self, rate: f64, id: VoiceId) {
        self.inner.submit_rate(rate, Some(id));
    }

    /// Position of the first voice in seconds
    pub fn seek(&self) -> f64 {
        let st = self.inner.state.lock();
        st.voices.first().map_or(0.0, |v| v.position())
    }

    /// Position of one voice in seconds
    pub fn voice_seek(&self, id: VoiceId) -> Option<f64> {
        self.inner.state.lock().voice(id).map(|v| v.position())
    }

    /// Move the first voice to `position` seconds
    pub fn set_seek(&self, position: f64) {
        self.inner.submit_seek(position, None);
    }

    /// Move one voice to `position` seconds
    pub fn seek_voice(&self, position: f64, id: VoiceId) {
        self.inner.submit_seek(position, Some(id));
    }

    // ========================================
    // Events
    // ========================================

    /// Call `callback` on every `kind` event
    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&SoundEvent) + Send + Sync + 'static,
    {
        self.inner.add_listener(kind, Arc::new(callback), None, false)
    }

    /// Call `callback` on `kind` events of one voice
    pub fn on_voice<F>(&self, kind: EventKind, id: VoiceId, callback: F) -> ListenerId
    where
        F: Fn(&SoundEvent) + Send + Sync + 'static,
    {
        self.inner
            .add_listener(kind, Arc::new(callback), Some(id), false)
    }

    /// Call `callback` on the next `kind` event only
    pub fn once<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&SoundEvent) + Send + Sync + 'static,
    {
        self.inner.add_listener(kind, Arc::new(callback), None, true)
    }

    /// Call `callback` on the next `kind` event of one voice
    pub fn once_voice<F>(&self, kind: EventKind, id: VoiceId, callback: F) -> ListenerId
    where
        F: Fn(&SoundEvent) + Send + Sync + 'static,
    {
        self.inner
            .add_listener(kind, Arc::new(callback), Some(id), true)
    }

    /// Remove every listener of `kind`; returns how many were removed
    pub fn off(&self, kind: EventKind) -> usize {
        self.inner.state.lock().listeners.remove(Some(kind), None, None)
    }

    /// Remove one listener
    pub fn off_listener(&self, listener: ListenerId) -> bool {
        self.inner
            .state
            .lock()
            .listeners
            .remove(None, Some(listener), None)
            > 0
    }

    /// Remove the `kind` listeners bound to one voice
    pub fn off_voice(&self, kind: EventKind, id: VoiceId) -> usize {
        self.inner
            .state
            .lock()
            .listeners
            .remove(Some(kind), None, Some(id))
    }

    /// Remove every listener
    pub fn off_all(&self) -> usize {
        self.inner.state.lock().listeners.remove(None, None, None)
    }

    /// Stream of every event this sound emits
    pub fn subscribe(&self) -> broadcast::Receiver<SoundEvent> {
        self.inner.bus.subscribe()
    }
}

impl SoundInner {
    /// Run `f` under the lock, then replay runnable queued commands
    fn with_state<R>(&self, f: impl FnOnce(&SoundInner, &mut SoundState) -> R) -> R {
        let mut st = self.state.lock();
        let result = f(self, &mut st);
        self.drain(&mut st);
        result
    }

    /// Run `command` now, or queue it until the sound is ready
    fn submit(&self, command: Command) {
        self.with_state(|inner, st| {
            if st.is_ready() {
                inner.execute(st, command);
            } else {
                debug!("Sound {}: queued {:?}", inner.key, command);
                st.queue.enqueue(command.tag(), command);
            }
        });
    }

    fn submit_volume(&self, volume: f32, voice: Option<VoiceId>) {
        if !(0.0..=1.0).contains(&volume) {
            warn!("Sound {}: ignoring volume {} outside [0.0, 1.0]", self.key, volume);
            return;
        }
        self.submit(Command::Volume { volume, voice });
    }

    fn submit_rate(&self, rate: f64, voice: Option<VoiceId>) {
        if !rate.is_finite() || rate == 0.0 {
            warn!("Sound {}: ignoring playback rate {}", self.key, rate);
            return;
        }
        self.submit(Command::Rate { rate, voice });
    }

    fn submit_seek(&self, position: f64, voice: Option<VoiceId>) {
        if !position.is_finite() || position < 0.0 {
            warn!("Sound {}: ignoring seek to {}", self.key, position);
            return;
        }
        self.submit(Command::Seek { position, voice });
    }

    /// Run a command against a ready sound
    fn execute(&self, st: &mut SoundState, command: Command) -> Completion {
        match command {
            Command::Play { voice } => self.play_voice(st, Target::Voice(voice), false).1,
            Command::Pause { voice } => {
                self.pause_voices(st, voice, false);
                Completion::Done
            }
            Command::Stop { voice } => {
                self.stop_voices(st, voice, false);
                Completion::Done
            }
            Command::Mute { muted, voice } => {
                self.apply_mute(st, muted, voice);
                Completion::Done
            }
            Command::Volume { volume, voice } => {
                self.apply_volume(st, volume, voice);
                Completion::Done
            }
            Command::Fade {
                from,
                to,
                len,
                voice,
            } => self.start_fade(st, from, to, len, voice),
            Command::Loop { looping, voice } => {
                self.apply_loop(st, looping, voice);
                Completion::Done
            }
            Command::Rate { rate, voice } => {
                self.apply_rate(st, rate, voice);
                Completion::Done
            }
            Command::Seek { position, voice } => {
                self.apply_seek(st, position, voice);
                Completion::Done
            }
        }
    }

    /// Replay queued commands while the sound is ready
    fn drain(&self, st: &mut SoundState) {
        while st.is_ready() {
            let Some(command) = st.queue.start_next() else {
                break;
            };
            debug!("Sound {}: replaying {:?}", self.key, command);
            match self.execute(st, command) {
                Completion::Done => {
                    st.queue.finish_current();
                }
                Completion::Pending => break,
            }
        }
    }

    fn add_listener(
        &self,
        kind: EventKind,
        callback: Callback,
        voice: Option<VoiceId>,
        once: bool,
    ) -> ListenerId {
        self.state.lock().listeners.add(kind, callback, voice, once)
    }

    // ========================================
    // Emission
    // ========================================

    fn emit(&self, st: &mut SoundState, kind: EventKind, voice: Option<VoiceId>) {
        self.emit_event(st, SoundEvent::new(kind, self.key, voice));
    }

    fn emit_event(&self, st: &mut SoundState, event: SoundEvent) {
        let callbacks = st.listeners.take_matching(&event);
        self.ctx.dispatcher().dispatch(callbacks, event.clone());
        let kind = event.kind;
        self.bus.emit_lossy(event);
        st.queue.complete(kind);
    }

    // ========================================
    // Context callbacks (context lock not held)
    // ========================================

    pub(crate) fn key(&self) -> SoundKey {
        self.key
    }

    /// Master volume changed
    pub(crate) fn apply_context_volume(&self, volume: f32) {
        let mut st = self.state.lock();
        for voice in st.voices.iter_mut() {
            if let VoiceNode::Streaming(s) = &mut voice.node {
                s.element.set_volume(voice.volume * volume);
            }
        }
    }

    /// Master mute changed
    pub(crate) fn apply_context_mute(&self, muted: bool) {
        let mut st = self.state.lock();
        for voice in st.voices.iter_mut() {
            if let VoiceNode::Streaming(s) = &mut voice.node {
                s.element.set_muted(muted || voice.muted);
            }
        }
    }

    /// Whether any graph voice is playing
    pub(crate) fn has_active_graph_voice(&self) -> bool {
        let st = self.state.lock();
        st.voices.iter().any(|v| v.is_graph() && !v.paused)
    }

    /// Gesture unlock: unlock and reload locked streaming elements
    pub(crate) fn unlock_elements(&self) {
        let mut st = self.state.lock();
        let seq = st.load_seq;
        let preload = st.preload;
        let mut reloaded = 0;
        for voice in st.voices.iter_mut() {
            let VoiceNode::Streaming(s) = &mut voice.node else {
                continue;
            };
            if s.element.is_unlocked() {
                continue;
            }
            s.element.set_unlocked(true);
            if s.element.source().is_some() {
                s.element.load(preload);
                reloaded += 1;
                self.watch_element(voice, seq);
            }
        }
        if reloaded > 0 {
            debug!("Sound {}: reloaded {} unlocked element(s)", self.key, reloaded);
        }
    }

    /// Unlock handshake finished
    pub(crate) fn emit_unlock(&self) {
        let mut st = self.state.lock();
        self.emit(&mut st, EventKind::Unlock, None);
    }

    /// Device resumed: run the starts that were waiting for it
    pub(crate) fn on_context_resume(&self) {
        let mut st = self.state.lock();
        let waiting: Vec<usize> = st
            .voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_graph() && v.start_pending.is_some())
            .map(|(i, _)| i)
            .collect();
        if !waiting.is_empty() {
            st.play_lock = false;
        }
        for idx in waiting {
            if let Some(pending) = st.voices[idx].start_pending.take() {
                self.start_graph(&mut st, idx, pending);
            }
        }
        self.emit(&mut st, EventKind::Resume, None);
        self.drain(&mut st);
    }

    /// Device failed to resume: fail the starts that were waiting for it
    pub(crate) fn on_resume_failed(&self, reason: &crate::error::BackendError) {
        let mut st = self.state.lock();
        let waiting: Vec<VoiceId> = st
            .voices
            .iter_mut()
            .filter(|v| v.is_graph())
            .filter_map(|v| v.start_pending.take().map(|_| v.id))
            .collect();
        if waiting.is_empty() {
            return;
        }
        st.play_lock = false;
        for id in waiting {
            self.fail_start(&mut st, id, reason.clone().into());
        }
        self.drain(&mut st);
    }

    /// Handle for spawning completions that re-enter this sound
    fn weak(&self) -> Weak<SoundInner> {
        self.this.clone()
    }
}

impl Drop for SoundInner {
    fn drop(&mut self) {
        let st = self.state.get_mut();
        st.loader = None;
        for voice in st.voices.drain(..) {
            match voice.node {
                VoiceNode::Graph(mut g) => g.disconnect(),
                VoiceNode::Streaming(s) => self.ctx.release_element(s.into_element()),
            }
        }
        if let Some(key) = st.cache_key.take() {
            self.ctx.cache().release(&key);
        }
        self.ctx.unregister(self.key);
        debug!("Sound {} dropped", self.key);
    }
}
