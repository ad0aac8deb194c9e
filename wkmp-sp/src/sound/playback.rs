//! Transport and voice lifecycle
//!
//! `play` reserves a voice (recycling an ended one when possible), computes
//! the start position and sprite bounds, then starts the backend:
//!
//! - **Graph**: a fresh buffer source per start. When the device is
//!   suspended the start waits for the resume.
//! - **Streaming**: the element is positioned and asked to play. The request
//!   may be refused (autoplay restrictions), which surfaces as `playerror`.
//!
//! Every started voice arms an end timer for the remaining sprite time. When
//! it fires the voice either loops (and the timer re-arms) or finishes.

use super::queue::Completion;
use super::{Command, LoadState, SoundInner, SoundState};
use crate::error::{BackendError, PlayError};
use crate::events::{EventKind, SoundEvent};
use crate::timer::Timer;
use crate::voice::{PendingStart, Voice, VoiceId, VoiceNode, DEFAULT_SPRITE};
use std::time::Duration;
use tracing::{debug, warn};

/// Streaming elements may lag their nominal position by this much at the end
const END_TOLERANCE: f64 = 0.001;

/// Re-check interval when a streaming element has not yet reached the end
const END_RECHECK: f64 = 0.1;

/// Upper bound for timer delays
const MAX_TIMER_DELAY: Duration = Duration::from_secs(365 * 86_400);

/// What a `play` call addresses
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Target {
    /// The whole clip, or the single paused voice
    Default,
    /// A named sprite on a fresh voice
    Sprite(String),
    /// An existing voice
    Voice(VoiceId),
}

/// Timer delay for `seconds` of wall-clock time
fn timer_delay(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds)
        .unwrap_or(MAX_TIMER_DELAY)
        .min(MAX_TIMER_DELAY)
}

impl SoundInner {
    /// Play `target`; returns the voice id and how the start completed
    pub(super) fn play_voice(
        &self,
        st: &mut SoundState,
        target: Target,
        internal: bool,
    ) -> (Option<VoiceId>, Completion) {
        let (requested, sprite) = match target {
            Target::Voice(id) => (Some(id), None),
            Target::Sprite(name) => {
                if st.load_state == LoadState::Loaded && !st.sprites.contains_key(&name) {
                    warn!("Sound {}: no sprite named '{}'", self.key, name);
                    return (None, Completion::Done);
                }
                (None, Some(name))
            }
            Target::Default => match self.single_paused_voice(st) {
                Some(id) => (Some(id), None),
                None => (None, Some(DEFAULT_SPRITE.to_string())),
            },
        };

        let idx = match requested {
            Some(id) => match st.voice_index(id) {
                Some(idx) => idx,
                None => {
                    debug!("Sound {}: no voice {} to play", self.key, id);
                    return (None, Completion::Done);
                }
            },
            None => self.inactive_voice(st),
        };
        let id = st.voices[idx].id;
        let sprite = sprite.unwrap_or_else(|| st.voices[idx].sprite.clone());

        if st.load_state != LoadState::Loaded {
            let voice = &mut st.voices[idx];
            voice.sprite = sprite;
            voice.ended = false;
            st.queue
                .enqueue(Some(EventKind::Play), Command::Play { voice: id });
            debug!("Sound {}: voice {} will play once loaded", self.key, id);
            return (Some(id), Completion::Done);
        }

        if requested.is_some() && !st.voices[idx].paused {
            return (Some(id), Completion::Done);
        }

        let Some(bounds) = st.sprites.get(&sprite).copied() else {
            warn!("Sound {}: no sprite named '{}'", self.key, sprite);
            st.voices[idx].ended = true;
            return (None, Completion::Done);
        };

        let voice = &mut st.voices[idx];
        let seek = if voice.seek > 0.0 {
            voice.seek
        } else {
            bounds.start()
        };
        let duration = (bounds.stop() - seek).max(0.0);
        let pending = PendingStart {
            seek,
            duration,
            timeout: duration / voice.rate.abs(),
            internal,
        };
        voice.sprite = sprite;
        voice.ended = false;
        voice.start = bounds.start();
        voice.stop = bounds.stop();
        voice.looping = voice.looping || bounds.looping;

        if seek >= bounds.stop() {
            debug!(
                "Sound {}: voice {} starts at or past its sprite end",
                self.key, id
            );
            self.voice_ended(st, idx, true);
            return (Some(id), Completion::Done);
        }

        if !st.voices[idx].is_graph() {
            return (Some(id), self.play_streaming(st, idx, pending));
        }

        self.ctx.auto_resume();
        if self.ctx.device_running() {
            self.start_graph(st, idx, pending);
            return (Some(id), Completion::Done);
        }

        debug!("Sound {}: voice {} waits for the device to resume", self.key, id);
        st.play_lock = true;
        let voice = &mut st.voices[idx];
        voice.cancel_end_timer();
        voice.start_pending = Some(pending);
        (Some(id), Completion::Pending)
    }

    /// The only paused, not-ended voice of a loaded sound
    fn single_paused_voice(&self, st: &SoundState) -> Option<VoiceId> {
        if st.load_state != LoadState::Loaded || st.play_lock {
            return None;
        }
        let mut paused = st.voices.iter().filter(|v| v.paused && !v.ended);
        match (paused.next(), paused.next()) {
            (Some(voice), None) => Some(voice.id),
            _ => None,
        }
    }

    /// Start a graph voice now
    pub(super) fn start_graph(&self, st: &mut SoundState, idx: usize, pending: PendingStart) {
        let Some(buffer) = st.buffer.clone() else {
            warn!("Sound {}: graph start without a decoded buffer", self.key);
            return;
        };
        let voice = &mut st.voices[idx];
        let id = voice.id;
        let gain = if voice.muted { 0.0 } else { voice.volume };
        let (looping, range, rate) = (voice.looping, (voice.start, voice.stop), voice.rate);
        if let VoiceNode::Graph(g) = &mut voice.node {
            g.start(buffer, gain, pending.seek, pending.duration, looping, range, rate);
        }
        voice.mark_started(pending.seek);
        self.arm_end_timer(st, idx, pending.timeout);

        if !pending.internal {
            self.emit(st, EventKind::Play, Some(id));
        }
    }

    /// Start a streaming voice, waiting for its element when needed
    fn play_streaming(&self, st: &mut SoundState, idx: usize, pending: PendingStart) -> Completion {
        let preload = st.preload;
        let url = st.src.as_ref().map(|s| s.url.clone());
        let ctx_volume = self.ctx.volume();

        let voice = &mut st.voices[idx];
        let volume = voice.volume * ctx_volume;
        let ready = match &mut voice.node {
            VoiceNode::Streaming(s) => {
                // A stopped live stream released its source
                if s.element.source().is_none() {
                    if let Some(url) = &url {
                        s.load(url, preload, volume);
                    }
                }
                s.element.is_ready()
            }
            VoiceNode::Graph(_) => return Completion::Done,
        };

        if ready {
            return self.start_streaming(st, idx, pending);
        }

        let voice = &mut st.voices[idx];
        debug!("Sound {}: voice {} waits for its element", self.key, voice.id);
        voice.cancel_end_timer();
        voice.start_pending = Some(pending);
        st.play_lock = true;
        self.rewatch_element(st, idx);
        Completion::Pending
    }

    /// Position, configure and play a ready streaming element
    pub(super) fn start_streaming(
        &self,
        st: &mut SoundState,
        idx: usize,
        pending: PendingStart,
    ) -> Completion {
        let ctx_volume = self.ctx.volume();
        let ctx_muted = self.ctx.muted();
        let seq = st.load_seq;

        let voice = &mut st.voices[idx];
        let id = voice.id;
        let (muted, volume, rate) = (voice.muted, voice.volume, voice.rate);
        let VoiceNode::Streaming(s) = &mut voice.node else {
            return Completion::Done;
        };
        s.element.set_current_time(pending.seek);
        s.element.set_muted(muted || ctx_muted);
        s.element.set_volume(volume * ctx_volume);
        s.element.set_playback_rate(rate);
        let live = s.is_live();
        let play = s.element.play();

        voice.mark_started(pending.seek);
        st.play_lock = true;
        if !live && pending.timeout.is_finite() {
            self.arm_end_timer(st, idx, pending.timeout);
        }

        let weak = self.weak();
        self.ctx.runtime().spawn(async move {
            let result = play.await;
            if let Some(inner) = weak.upgrade() {
                inner.on_play_result(seq, id, pending.internal, result);
            }
        });
        Completion::Pending
    }

    fn on_play_result(&self, seq: u64, id: VoiceId, internal: bool, result: Result<(), BackendError>) {
        let mut st = self.state.lock();
        if st.load_seq != seq {
            return;
        }
        st.play_lock = false;

        match result {
            Ok(()) => {
                if let Some(idx) = st.voice_index(id) {
                    if let VoiceNode::Streaming(s) = &mut st.voices[idx].node {
                        s.element.set_unlocked(true);
                    }
                }
                if !internal {
                    self.emit(&mut st, EventKind::Play, Some(id));
                }
            }
            Err(e) => self.fail_start(&mut st, id, e.into()),
        }
        self.drain(&mut st);
    }

    /// Report a refused start; the voice ends up paused and ended
    pub(super) fn fail_start(&self, st: &mut SoundState, id: VoiceId, err: PlayError) {
        warn!("Sound {}: voice {} failed to start: {}", self.key, id, err);
        if let Some(idx) = st.voice_index(id) {
            let voice = &mut st.voices[idx];
            voice.cancel_end_timer();
            voice.start_pending = None;
            voice.paused = true;
            voice.ended = true;
            if let VoiceNode::Streaming(s) = &mut voice.node {
                s.element.pause();
            }
        }
        let mut event = SoundEvent::new(EventKind::PlayError, self.key, Some(id));
        event.message = Some(err.to_string());
        self.emit_event(st, event);
        st.queue.complete(EventKind::Play);
    }

    // ========================================
    // End of clip
    // ========================================

    /// (Re)arm the end timer of a voice
    pub(super) fn arm_end_timer(&self, st: &mut SoundState, idx: usize, seconds: f64) {
        let voice = &mut st.voices[idx];
        let seq = voice.cancel_end_timer();
        let id = voice.id;
        let weak = self.weak();
        voice.end_timer = Some(Timer::once(
            self.ctx.runtime(),
            timer_delay(seconds),
            move || async move {
                if let Some(inner) = weak.upgrade() {
                    inner.on_end_timer(id, seq);
                }
            },
        ));
    }

    fn on_end_timer(&self, id: VoiceId, seq: u64) {
        let mut st = self.state.lock();
        let Some(idx) = st.voice_index(id) else {
            return;
        };
        if st.voices[idx].timer_seq != seq {
            return;
        }
        self.voice_ended(&mut st, idx, false);
        self.drain(&mut st);
    }

    /// A voice reached its sprite end; `finish` skips looping
    fn voice_ended(&self, st: &mut SoundState, idx: usize, finish: bool) {
        let voice = &st.voices[idx];
        let id = voice.id;
        let looping = !finish
            && (voice.looping
                || st
                    .sprites
                    .get(&voice.sprite)
                    .is_some_and(|sprite| sprite.looping));

        if !finish {
            if let VoiceNode::Streaming(s) = &voice.node {
                if !s.element.is_paused() && s.element.current_time() + END_TOLERANCE < voice.stop {
                    self.arm_end_timer(st, idx, END_RECHECK);
                    return;
                }
            }
        }

        debug!("Sound {}: voice {} ended", self.key, id);
        self.emit(st, EventKind::End, Some(id));

        let graph = st.voices[idx].is_graph();
        match (graph, looping) {
            (true, true) => {
                let voice = &mut st.voices[idx];
                let start = voice.start;
                voice.seek = start;
                voice.reanchor(start);
                let period = (voice.stop - start) / voice.rate.abs();
                self.arm_end_timer(st, idx, period);
            }
            (true, false) => {
                let voice = &mut st.voices[idx];
                voice.cancel_end_timer();
                let start = voice.start;
                voice.mark_paused(start);
                voice.ended = true;
                voice.halt();
                self.ctx.request_auto_suspend();
            }
            (false, true) => {
                self.stop_voices(st, Some(id), true);
                self.play_voice(st, Target::Voice(id), true);
            }
            (false, false) => {
                self.stop_voices(st, Some(id), true);
            }
        }
    }

    // ========================================
    // Pause / stop
    // ========================================

    /// Pause voices, remembering their position
    pub(super) fn pause_voices(&self, st: &mut SoundState, target: Option<VoiceId>, internal: bool) {
        let mut any_graph = false;
        for id in st.target_ids(target) {
            let Some(idx) = st.voice_index(id) else {
                continue;
            };
            st.voices[idx].cancel_end_timer();
            if !st.voices[idx].paused {
                let position = st.voices[idx].position();
                self.stop_fade(st, idx);
                let voice = &mut st.voices[idx];
                voice.mark_paused(position);
                voice.halt();
                any_graph |= voice.is_graph();
            }
            if !internal {
                self.emit(st, EventKind::Pause, Some(id));
            }
        }
        if any_graph {
            self.ctx.request_auto_suspend();
        }
    }

    /// Stop voices: back to the sprite start, paused and ended
    pub(super) fn stop_voices(&self, st: &mut SoundState, target: Option<VoiceId>, internal: bool) {
        let mut any_graph = false;
        for id in st.target_ids(target) {
            let Some(idx) = st.voice_index(id) else {
                continue;
            };
            let voice = &mut st.voices[idx];
            voice.cancel_end_timer();
            voice.start_pending = None;
            self.stop_fade(st, idx);

            let voice = &mut st.voices[idx];
            let start = voice.start;
            voice.mark_paused(start);
            voice.ended = true;
            match &mut voice.node {
                VoiceNode::Graph(g) => {
                    g.stop();
                    any_graph = true;
                }
                VoiceNode::Streaming(s) => {
                    s.element.set_current_time(start);
                    s.element.pause();
                    if s.is_live() {
                        s.release_source();
                    }
                }
            }
            if !internal {
                self.emit(st, EventKind::Stop, Some(id));
            }
        }
        if any_graph {
            self.ctx.request_auto_suspend();
        }
    }

    // ========================================
    // Voice pool
    // ========================================

    /// Index of a voice ready for a new start
    fn inactive_voice(&self, st: &mut SoundState) -> usize {
        self.drain_pool(st);

        if let Some(idx) = st.voices.iter().position(|v| v.ended) {
            let id = self.ctx.next_voice_id();
            let defaults = st.defaults();
            st.voices[idx].reset(id, defaults);
            return idx;
        }

        let voice = self.create_voice(st);
        st.voices.push(voice);
        st.voices.len() - 1
    }

    /// Evict ended voices (newest first) beyond the pool limit
    fn drain_pool(&self, st: &mut SoundState) {
        let limit = st.pool;
        if st.voices.len() < limit {
            return;
        }
        let mut ended = st.voices.iter().filter(|v| v.ended).count();
        for idx in (0..st.voices.len()).rev() {
            if ended <= limit {
                break;
            }
            if !st.voices[idx].ended {
                continue;
            }
            self.stop_fade(st, idx);
            let voice = st.voices.remove(idx);
            debug!("Sound {}: evicted voice {}", self.key, voice.id);
            self.release_voice(voice);
            ended -= 1;
        }
    }

    fn release_voice(&self, voice: Voice) {
        match voice.node {
            VoiceNode::Graph(mut g) => g.disconnect(),
            VoiceNode::Streaming(s) => self.ctx.release_element(s.into_element()),
        }
    }
}
