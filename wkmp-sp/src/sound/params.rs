//! Voice parameters: volume, mute, fades, rate, loop and seek
//!
//! Each operation addresses either one voice or the whole sound. Group calls
//! also update the sound-level value that new voices inherit.
//!
//! Fades run on a ticker per voice. On the graph backend a native gain ramp
//! smooths the audio while the ticker keeps the reported volume current; the
//! ticker alone decides when the fade completes.

use super::playback::Target;
use super::queue::Completion;
use super::{SoundInner, SoundState};
use crate::events::EventKind;
use crate::fade::FadeScheduler;
use crate::timer::Timer;
use crate::voice::{ActiveFade, VoiceId, VoiceNode};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

impl SoundInner {
    /// Cancel a voice's fade, snapping its volume to the fade target
    pub(super) fn stop_fade(&self, st: &mut SoundState, idx: usize) {
        let voice = &mut st.voices[idx];
        let Some(fade) = voice.cancel_fade() else {
            return;
        };
        if let VoiceNode::Graph(g) = &voice.node {
            g.cancel_ramp();
        }
        let id = voice.id;
        let to = fade.scheduler.to();
        if fade.group {
            st.volume = to;
        }
        debug!("Sound {}: fade on voice {} stopped early", self.key, id);

        self.apply_volume(st, to, Some(id));
        self.emit(st, EventKind::Fade, Some(id));
    }

    /// Set volume, cancelling fades on the addressed voices
    pub(super) fn apply_volume(&self, st: &mut SoundState, volume: f32, target: Option<VoiceId>) {
        if target.is_none() {
            st.volume = volume;
        }
        let ctx_volume = self.ctx.volume();

        for id in st.target_ids(target) {
            let Some(idx) = st.voice_index(id) else {
                continue;
            };
            self.stop_fade(st, idx);

            let voice = &mut st.voices[idx];
            voice.volume = volume;
            if !voice.muted {
                match &mut voice.node {
                    VoiceNode::Graph(g) => g.set_gain(volume),
                    VoiceNode::Streaming(s) => s.element.set_volume(volume * ctx_volume),
                }
            }
            self.emit(st, EventKind::Volume, Some(id));
        }
    }

    pub(super) fn apply_mute(&self, st: &mut SoundState, muted: bool, target: Option<VoiceId>) {
        if target.is_none() {
            st.muted = muted;
        }
        let ctx_muted = self.ctx.muted();

        for id in st.target_ids(target) {
            let Some(idx) = st.voice_index(id) else {
                continue;
            };
            self.stop_fade(st, idx);

            let voice = &mut st.voices[idx];
            voice.muted = muted;
            let volume = voice.volume;
            match &mut voice.node {
                VoiceNode::Graph(g) => g.set_gain(if muted { 0.0 } else { volume }),
                VoiceNode::Streaming(s) => s.element.set_muted(ctx_muted || muted),
            }
            self.emit(st, EventKind::Mute, Some(id));
        }
    }

    /// Start fades; pending until the first fade completes
    pub(super) fn start_fade(
        &self,
        st: &mut SoundState,
        from: f32,
        to: f32,
        len: Duration,
        target: Option<VoiceId>,
    ) -> Completion {
        let from = from.clamp(0.0, 1.0);
        let to = to.clamp(0.0, 1.0);
        self.apply_volume(st, from, target);

        let mut started = false;
        for id in st.target_ids(target) {
            let Some(idx) = st.voice_index(id) else {
                continue;
            };
            let voice = &st.voices[idx];
            if let VoiceNode::Graph(g) = &voice.node {
                if !voice.muted {
                    g.ramp(from, to, len);
                }
            }
            self.schedule_fade(st, idx, FadeScheduler::new(from, to, len), target.is_none());
            started = true;
        }

        if started {
            Completion::Pending
        } else {
            Completion::Done
        }
    }

    fn schedule_fade(&self, st: &mut SoundState, idx: usize, scheduler: FadeScheduler, group: bool) {
        let interval = scheduler.interval();
        let voice = &mut st.voices[idx];
        voice.cancel_fade();
        let seq = voice.fade_seq;
        let id = voice.id;

        let weak = self.weak();
        let mut last_tick = Instant::now();
        let ticker = Timer::every(self.ctx.runtime(), interval, move || {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            let now = Instant::now();
            let elapsed = now - last_tick;
            last_tick = now;
            inner.on_fade_tick(id, seq, elapsed)
        });

        voice.fade = Some(ActiveFade {
            scheduler,
            group,
            _ticker: ticker,
        });
    }

    /// One fade tick; returns whether the ticker should keep running
    fn on_fade_tick(&self, id: VoiceId, seq: u64, elapsed: Duration) -> bool {
        let mut st = self.state.lock();
        let Some(idx) = st.voice_index(id) else {
            return false;
        };
        let ctx_volume = self.ctx.volume();

        let voice = &mut st.voices[idx];
        if voice.fade_seq != seq {
            return false;
        }
        let Some(fade) = voice.fade.as_mut() else {
            return false;
        };
        let step = fade.scheduler.tick(elapsed);
        let group = fade.group;
        let volume = step.volume();

        voice.volume = volume;
        if !voice.muted {
            if let VoiceNode::Streaming(s) = &mut voice.node {
                s.element.set_volume(volume * ctx_volume);
            }
        }
        if group {
            st.volume = volume;
        }
        if !step.is_done() {
            return true;
        }

        // Dropping the fade aborts this ticker once the callback returns
        st.voices[idx].cancel_fade();
        self.apply_volume(&mut st, volume, Some(id));
        self.emit(&mut st, EventKind::Fade, Some(id));
        self.drain(&mut st);
        false
    }

    pub(super) fn apply_rate(&self, st: &mut SoundState, rate: f64, target: Option<VoiceId>) {
        if target.is_none() {
            st.rate = rate;
        }

        for id in st.target_ids(target) {
            let Some(idx) = st.voice_index(id) else {
                continue;
            };
            let voice = &mut st.voices[idx];
            if !voice.paused {
                let position = voice.position();
                voice.reanchor(position);
            }
            voice.rate = rate;
            match &mut voice.node {
                VoiceNode::Graph(g) => g.set_rate(rate),
                VoiceNode::Streaming(s) => s.element.set_playback_rate(rate),
            }

            let remaining = (voice.stop - voice.position()).max(0.0) / rate.abs();
            if (voice.end_timer.is_some() || !voice.paused) && remaining.is_finite() {
                self.arm_end_timer(st, idx, remaining);
            }
            self.emit(st, EventKind::Rate, Some(id));
        }
    }

    pub(super) fn apply_loop(&self, st: &mut SoundState, looping: bool, target: Option<VoiceId>) {
        if target.is_none() {
            st.looping = looping;
        }

        for id in st.target_ids(target) {
            let Some(idx) = st.voice_index(id) else {
                continue;
            };
            let voice = &mut st.voices[idx];
            voice.looping = looping;
            let range = (voice.start, voice.stop);
            if let VoiceNode::Graph(g) = &mut voice.node {
                g.set_loop(looping, range);
            }
            // Restart so the end timer follows the new flag
            if !voice.paused {
                self.pause_voices(st, Some(id), true);
                self.play_voice(st, Target::Voice(id), true);
            }
        }
    }

    /// Move a voice (the first one by default) to `position` seconds
    pub(super) fn apply_seek(&self, st: &mut SoundState, position: f64, target: Option<VoiceId>) {
        let Some(id) = target.or_else(|| st.voices.first().map(|v| v.id)) else {
            return;
        };
        let Some(idx) = st.voice_index(id) else {
            return;
        };

        let playing = !st.voices[idx].paused;
        if playing {
            self.pause_voices(st, Some(id), true);
        }

        let voice = &mut st.voices[idx];
        voice.seek = position;
        voice.ended = false;
        voice.cancel_end_timer();
        if let VoiceNode::Streaming(s) = &mut voice.node {
            s.element.set_current_time(position);
        }

        if playing {
            self.play_voice(st, Target::Voice(id), true);
        }
        self.emit(st, EventKind::Seek, Some(id));
    }
}
