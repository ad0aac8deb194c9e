//! Asset loading
//!
//! Graph sounds fetch the resolved source (or decode an inline `data:` URI
//! locally) and decode it through the context's buffer cache, so sounds
//! sharing a URL share one buffer. A transport failure with no HTTP status
//! falls back once to the streaming backend; status and decode failures are
//! reported as `loaderror`.
//!
//! Streaming sounds point every voice element at the source and wait for the
//! elements to become ready. The first ready element fixes the duration
//! (rounded up to 0.1 s) and marks the sound loaded.

use super::{LoadState, SoundInner, SoundState};
use crate::backend::{BackendKind, DecodedAudio, FetchOptions, FetchRequest, Platform};
use crate::error::{BackendError, LoadError};
use crate::events::{EventKind, SoundEvent};
use crate::sound::{source, Sprite};
use crate::timer::Timer;
use crate::voice::{GraphVoice, StreamingVoice, Voice, VoiceId, VoiceNode, DEFAULT_SPRITE};
use base64::Engine as _;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Raw bytes of an inline `data:` URI
fn decode_inline(url: &str) -> Result<Vec<u8>, LoadError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| LoadError::InlineData("not a data URI".to_string()))?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| LoadError::InlineData("missing payload separator".to_string()))?;
    if header.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| LoadError::InlineData(e.to_string()))
    } else {
        Ok(data.as_bytes().to_vec())
    }
}

/// Fetch (or inline-decode) and decode one source
async fn fetch_and_decode(
    platform: Platform,
    url: String,
    options: FetchOptions,
    ext: String,
) -> Result<DecodedAudio, LoadError> {
    let bytes = if url.starts_with("data:") {
        decode_inline(&url)?
    } else {
        platform
            .fetcher
            .fetch(FetchRequest { url, options })
            .await?
    };
    Ok(platform.decoder.decode(bytes, Some(ext)).await?)
}

impl SoundInner {
    /// Resolve the source and start loading
    pub(super) fn load(&self, st: &mut SoundState) {
        if st.load_state != LoadState::Unloaded {
            debug!("Sound {} is already {}", self.key, st.load_state);
            return;
        }

        let chosen = source::resolve(&st.sources, &st.formats, |ext| self.ctx.codecs(ext));
        let Some(chosen) = chosen else {
            error!("Sound {}: no codec support for {:?}", self.key, st.sources);
            self.report_load_error(st, None, LoadError::NoCodecSupport);
            return;
        };

        info!(
            "Loading sound {} from {} ({} backend)",
            self.key,
            preview(&chosen.url),
            st.backend
        );
        st.src = Some(chosen);
        if !st.registered {
            self.ctx.register(self.key, self.weak());
            st.registered = true;
        }
        // Eager first voice; its element is pointed at the source below
        if st.voices.is_empty() {
            let voice = self.create_voice(st);
            st.voices.push(voice);
        }
        st.load_state = LoadState::Loading;
        st.load_seq += 1;

        match st.backend {
            BackendKind::Streaming => self.load_elements(st),
            BackendKind::Graph => self.load_buffer(st),
        }
    }

    /// New voice on the sound's backend
    pub(super) fn create_voice(&self, st: &mut SoundState) -> Voice {
        let id = self.ctx.next_voice_id();
        let defaults = st.defaults();

        if st.backend == BackendKind::Graph {
            match self.ctx.graph_output() {
                Some(graph) => {
                    let gain = if defaults.muted { 0.0 } else { defaults.volume };
                    let node = GraphVoice::new(graph.device, &graph.master, gain);
                    return Voice::new(id, defaults, VoiceNode::Graph(node));
                }
                None => {
                    warn!(
                        "Sound {}: graph device unavailable, switching to streaming backend",
                        self.key
                    );
                    st.backend = BackendKind::Streaming;
                }
            }
        }

        let mut node = StreamingVoice::new(self.ctx.obtain_element());
        node.element.set_volume(defaults.volume * self.ctx.volume());
        node.element.set_muted(defaults.muted || self.ctx.muted());
        let mut voice = Voice::new(id, defaults, VoiceNode::Streaming(node));
        if st.load_state != LoadState::Unloaded {
            self.attach_source(st, &mut voice);
        }
        voice
    }

    /// Point a streaming voice at the resolved source and watch it
    fn attach_source(&self, st: &SoundState, voice: &mut Voice) {
        let Some(src) = &st.src else {
            return;
        };
        let volume = voice.volume * self.ctx.volume();
        if let VoiceNode::Streaming(s) = &mut voice.node {
            s.load(&src.url, st.preload, volume);
        }
        self.watch_element(voice, st.load_seq);
    }

    /// Wait for a streaming voice's element to become ready (or fail)
    pub(super) fn watch_element(&self, voice: &mut Voice, seq: u64) {
        let id = voice.id;
        let VoiceNode::Streaming(s) = &mut voice.node else {
            return;
        };
        let ready = s.ready();
        let weak = self.weak();
        s.watcher = Some(Timer::spawn(self.ctx.runtime(), async move {
            let result = ready.await;
            if let Some(inner) = weak.upgrade() {
                inner.on_element_ready(seq, id, result);
            }
        }));
    }

    /// Watch the element of a voice under its current id (recycled voices
    /// may still have a watcher reporting their previous id)
    pub(super) fn rewatch_element(&self, st: &mut SoundState, idx: usize) {
        let seq = st.load_seq;
        self.watch_element(&mut st.voices[idx], seq);
    }

    fn load_elements(&self, st: &mut SoundState) {
        let seq = st.load_seq;
        let Some(src) = st.src.clone() else {
            return;
        };
        let ctx_volume = self.ctx.volume();
        let preload = st.preload;
        for voice in st.voices.iter_mut() {
            let volume = voice.volume * ctx_volume;
            if let VoiceNode::Streaming(s) = &mut voice.node {
                s.load(&src.url, preload, volume);
            }
            self.watch_element(voice, seq);
        }
    }

    fn load_buffer(&self, st: &mut SoundState) {
        let Some(src) = st.src.clone() else {
            return;
        };
        let key = src.url.clone();
        if st.cache_key.is_none() {
            self.ctx.cache().retain(&key);
            st.cache_key = Some(key.clone());
        }

        if let Some(buffer) = self.ctx.cache().get(&key) {
            debug!("Sound {}: buffer cache hit", self.key);
            self.buffer_ready(st, buffer);
            return;
        }

        let seq = st.load_seq;
        let weak = self.weak();
        let ctx = self.ctx.clone();
        let options = st.fetch.clone();
        st.loader = Some(Timer::spawn(self.ctx.runtime(), async move {
            let platform = ctx.platform().clone();
            let result = ctx
                .cache()
                .get_or_load(&key, || fetch_and_decode(platform, key.clone(), options, src.ext))
                .await;
            if let Some(inner) = weak.upgrade() {
                inner.on_buffer_loaded(seq, result);
            }
        }));
    }

    fn on_buffer_loaded(&self, seq: u64, result: Result<Arc<DecodedAudio>, LoadError>) {
        let mut st = self.state.lock();
        if st.load_seq != seq || st.load_state != LoadState::Loading {
            return;
        }
        st.loader = None;

        match result {
            Ok(buffer) => self.buffer_ready(&mut st, buffer),
            Err(LoadError::Network(reason)) if !st.fallback_used => {
                warn!(
                    "Sound {}: network failure ({}), falling back to streaming backend",
                    self.key, reason
                );
                self.fall_back_to_streaming(&mut st);
            }
            Err(err) => {
                error!("Sound {}: {}", self.key, err);
                self.report_load_error(&mut st, None, err);
            }
        }
        self.drain(&mut st);
    }

    fn buffer_ready(&self, st: &mut SoundState, buffer: Arc<DecodedAudio>) {
        st.duration = buffer.duration();
        st.buffer = Some(buffer);
        self.mark_loaded(st);
    }

    /// Rebuild every voice on the streaming backend, keeping voice ids so
    /// queued commands still find their voices
    fn fall_back_to_streaming(&self, st: &mut SoundState) {
        st.fallback_used = true;
        st.backend = BackendKind::Streaming;
        if let Some(key) = st.cache_key.take() {
            self.ctx.cache().release(&key);
        }

        let ctx_volume = self.ctx.volume();
        let ctx_muted = self.ctx.muted();
        for voice in st.voices.iter_mut() {
            voice.cancel_end_timer();
            voice.cancel_fade();
            let mut node = StreamingVoice::new(self.ctx.obtain_element());
            node.element.set_volume(voice.volume * ctx_volume);
            node.element.set_muted(voice.muted || ctx_muted);
            if let VoiceNode::Graph(mut old) = std::mem::replace(&mut voice.node, VoiceNode::Streaming(node)) {
                old.disconnect();
            }
        }

        st.load_state = LoadState::Unloaded;
        self.load(st);
    }

    /// Streaming element finished buffering (or failed)
    fn on_element_ready(&self, seq: u64, id: VoiceId, result: Result<f64, BackendError>) {
        let mut st = self.state.lock();
        if st.load_seq != seq {
            return;
        }

        match result {
            Ok(duration) => {
                if st.load_state != LoadState::Loaded {
                    st.duration = if duration.is_finite() {
                        (duration * 10.0).ceil() / 10.0
                    } else {
                        duration
                    };
                    self.mark_loaded(&mut st);
                }
                if let Some(idx) = st.voice_index(id) {
                    if let Some(pending) = st.voices[idx].start_pending.take() {
                        self.start_streaming(&mut st, idx, pending);
                    }
                }
            }
            Err(err) => {
                let err = LoadError::from(err);
                error!("Sound {}: voice {} failed to load: {}", self.key, id, err);
                let waiting = st
                    .voice_index(id)
                    .and_then(|idx| st.voices[idx].start_pending.take())
                    .is_some();
                if waiting {
                    st.play_lock = false;
                    if let Some(idx) = st.voice_index(id) {
                        let voice = &mut st.voices[idx];
                        voice.paused = true;
                        voice.ended = true;
                    }
                    st.queue.complete(EventKind::Play);
                }
                self.report_load_error(&mut st, Some(id), err);
            }
        }
        self.drain(&mut st);
    }

    /// First successful load: synthesize the default sprite, emit `load`
    fn mark_loaded(&self, st: &mut SoundState) {
        let duration_ms = st.duration * 1000.0;
        st.sprites
            .entry(DEFAULT_SPRITE.to_string())
            .or_insert_with(|| Sprite::new(0.0, duration_ms));
        if st.load_state == LoadState::Loaded {
            return;
        }
        st.load_state = LoadState::Loaded;
        info!("Sound {} loaded ({:.2}s)", self.key, st.duration);
        self.emit(st, EventKind::Load, None);
    }

    /// Emit `loaderror`; an asset-level failure returns to `Unloaded`
    fn report_load_error(&self, st: &mut SoundState, voice: Option<VoiceId>, err: LoadError) {
        if st.load_state == LoadState::Loading {
            st.load_state = LoadState::Unloaded;
            st.loader = None;
            st.buffer = None;
            if let Some(key) = st.cache_key.take() {
                self.ctx.cache().release(&key);
            }
        }
        let mut event = SoundEvent::new(EventKind::LoadError, self.key, voice);
        event.message = Some(err.to_string());
        event.code = err.code();
        self.emit_event(st, event);
    }

    /// Stop everything, release backend resources and forget the asset
    pub(super) fn unload(&self) {
        {
            let mut st = self.state.lock();
            let playing: Vec<VoiceId> = st
                .voices
                .iter()
                .filter(|v| !v.paused)
                .map(|v| v.id)
                .collect();
            for id in playing {
                self.stop_voices(&mut st, Some(id), false);
            }

            for mut voice in st.voices.drain(..) {
                voice.cancel_end_timer();
                voice.cancel_fade();
                match voice.node {
                    VoiceNode::Graph(mut g) => g.disconnect(),
                    VoiceNode::Streaming(s) => self.ctx.release_element(s.into_element()),
                }
            }

            st.queue.clear();
            st.play_lock = false;
            st.loader = None;
            st.load_seq += 1;
            st.buffer = None;
            if let Some(key) = st.cache_key.take() {
                self.ctx.cache().release(&key);
            }
            st.load_state = LoadState::Unloaded;
            st.duration = 0.0;
            st.registered = false;
        }
        self.ctx.unregister(self.key);
        info!("Sound {} unloaded", self.key);
    }
}

/// Shorten inline sources for logging
fn preview(url: &str) -> &str {
    if url.starts_with("data:") {
        url.split_once(',').map_or(url, |(header, _)| header)
    } else {
        url
    }
}
