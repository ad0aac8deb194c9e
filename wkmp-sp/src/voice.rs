//! Voices: one playback instance of a sound
//!
//! **Responsibilities:**
//! - Per-instance parameters (volume, mute, loop, rate, sprite, seek)
//! - Paused/ended flags and the end-of-clip timer
//! - The backend node, fixed at construction as one of two variants:
//!   [`GraphVoice`] (gain node + single-use buffer source per start) or
//!   [`StreamingVoice`] (one persistent media element)
//!
//! Voices are owned by their sound. They refer back to it only through the
//! sound key carried in emitted events. Recycling a voice (`reset`) gives it a
//! fresh id and the sound's current defaults but keeps its backend node.

use crate::backend::{AudioGraph, BackendFuture, BufferSourceNode, DecodedAudio, GainNode};
use crate::backend::{MediaElement, Preload};
use crate::fade::FadeScheduler;
use crate::timer::Timer;
use std::sync::Arc;
use std::time::Duration;

/// Name of the sprite spanning the whole clip
pub const DEFAULT_SPRITE: &str = "__default";

/// Graph sources play "forever" while looping; the end timer drives looping
const LOOP_PLAY_SECONDS: f64 = 86_400.0;

/// Unique voice identifier (never reused within a context)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u64);

impl VoiceId {
    /// Wrap a raw id
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sound-level defaults copied into new and recycled voices
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct VoiceDefaults {
    pub(crate) volume: f32,
    pub(crate) muted: bool,
    pub(crate) looping: bool,
    pub(crate) rate: f64,
}

/// A fade in progress on one voice
pub(crate) struct ActiveFade {
    pub(crate) scheduler: FadeScheduler,
    /// Group fades also drive the sound's nominal volume
    pub(crate) group: bool,
    pub(crate) _ticker: Timer,
}

/// A start computed by `play` but deferred until the backend is ready
/// (device resumed, element buffered)
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PendingStart {
    pub(crate) seek: f64,
    pub(crate) duration: f64,
    /// Wall-clock seconds until the end of the sprite
    pub(crate) timeout: f64,
    /// Suppress the `play` event
    pub(crate) internal: bool,
}

/// One playback instance
pub(crate) struct Voice {
    pub(crate) id: VoiceId,
    pub(crate) volume: f32,
    pub(crate) muted: bool,
    pub(crate) looping: bool,
    pub(crate) rate: f64,
    pub(crate) sprite: String,
    /// Position recorded at the last start/pause/seek (seconds)
    pub(crate) seek: f64,
    /// Sprite bounds of the last start (seconds)
    pub(crate) start: f64,
    pub(crate) stop: f64,
    pub(crate) paused: bool,
    pub(crate) ended: bool,
    pub(crate) node: VoiceNode,
    pub(crate) end_timer: Option<Timer>,
    pub(crate) fade: Option<ActiveFade>,
    pub(crate) start_pending: Option<PendingStart>,
    /// Fences callbacks of cancelled timers; bumped on every arm/cancel
    pub(crate) timer_seq: u64,
    pub(crate) fade_seq: u64,
    /// Position anchor while playing on the graph: (position, device time)
    anchor: Option<(f64, f64)>,
}

impl Voice {
    /// New voice, paused and ended until first played
    pub(crate) fn new(id: VoiceId, defaults: VoiceDefaults, node: VoiceNode) -> Self {
        Self {
            id,
            volume: defaults.volume,
            muted: defaults.muted,
            looping: defaults.looping,
            rate: defaults.rate,
            sprite: DEFAULT_SPRITE.to_string(),
            seek: 0.0,
            start: 0.0,
            stop: 0.0,
            paused: true,
            ended: true,
            node,
            end_timer: None,
            fade: None,
            start_pending: None,
            timer_seq: 0,
            fade_seq: 0,
            anchor: None,
        }
    }

    /// Recycle: fresh id, sound defaults, node kept
    pub(crate) fn reset(&mut self, id: VoiceId, defaults: VoiceDefaults) {
        self.cancel_end_timer();
        self.cancel_fade();
        self.start_pending = None;
        self.id = id;
        self.volume = defaults.volume;
        self.muted = defaults.muted;
        self.looping = defaults.looping;
        self.rate = defaults.rate;
        self.sprite = DEFAULT_SPRITE.to_string();
        self.seek = 0.0;
        self.anchor = None;
        self.paused = true;
        self.ended = true;
    }

    /// Whether this voice plays through the graph backend
    pub(crate) fn is_graph(&self) -> bool {
        matches!(self.node, VoiceNode::Graph(_))
    }

    /// Drop the end-of-clip timer; returns the new fence value
    pub(crate) fn cancel_end_timer(&mut self) -> u64 {
        self.end_timer = None;
        self.timer_seq += 1;
        self.timer_seq
    }

    /// Drop the fade ticker without touching the volume
    pub(crate) fn cancel_fade(&mut self) -> Option<ActiveFade> {
        self.fade_seq += 1;
        self.fade.take()
    }

    /// Mark the voice as playing from `seek`
    pub(crate) fn mark_started(&mut self, seek: f64) {
        self.paused = false;
        self.ended = false;
        self.seek = seek;
        self.anchor = match &self.node {
            VoiceNode::Graph(g) => Some((seek, g.now())),
            VoiceNode::Streaming(_) => None,
        };
    }

    /// Re-anchor the graph position clock (rate changes, loop restarts)
    pub(crate) fn reanchor(&mut self, position: f64) {
        if let VoiceNode::Graph(g) = &self.node {
            self.anchor = Some((position, g.now()));
        }
    }

    /// Mark paused at the current position
    pub(crate) fn mark_paused(&mut self, position: f64) {
        self.seek = position;
        self.anchor = None;
        self.paused = true;
    }

    /// Playback position in seconds
    pub(crate) fn position(&self) -> f64 {
        match &self.node {
            VoiceNode::Graph(g) => match (self.paused, self.anchor) {
                (false, Some((pos, at))) => pos + (g.now() - at).max(0.0) * self.rate.abs(),
                _ => self.seek,
            },
            VoiceNode::Streaming(s) => s.element.current_time(),
        }
    }

    /// Backend stop primitive (graph source released, element paused)
    pub(crate) fn halt(&mut self) {
        match &mut self.node {
            VoiceNode::Graph(g) => g.stop(),
            VoiceNode::Streaming(s) => s.element.pause(),
        }
    }
}

/// Closed set of backend nodes
pub(crate) enum VoiceNode {
    Graph(GraphVoice),
    Streaming(StreamingVoice),
}

/// Graph-backend node: a gain routed into the master gain, plus the
/// single-use source of the current start
pub(crate) struct GraphVoice {
    device: Arc<dyn AudioGraph>,
    gain: Arc<dyn GainNode>,
    source: Option<Box<dyn BufferSourceNode>>,
}

impl GraphVoice {
    pub(crate) fn new(device: Arc<dyn AudioGraph>, master: &Arc<dyn GainNode>, volume: f32) -> Self {
        let gain = device.create_gain(Some(master));
        gain.set_value_at_time(volume, device.current_time());
        Self {
            device,
            gain,
            source: None,
        }
    }

    /// Device clock
    pub(crate) fn now(&self) -> f64 {
        self.device.current_time()
    }

    /// Build a fresh source on `buffer` and start it
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn start(
        &mut self,
        buffer: Arc<DecodedAudio>,
        gain: f32,
        offset: f64,
        duration: f64,
        looping: bool,
        loop_range: (f64, f64),
        rate: f64,
    ) {
        self.stop();
        let now = self.now();
        let mut source = self.device.create_buffer_source(buffer, &self.gain);
        source.set_loop(looping, loop_range.0, loop_range.1);
        source.set_playback_rate(rate, now);
        self.gain.set_value_at_time(gain, now);
        source.start(0.0, offset, if looping { LOOP_PLAY_SECONDS } else { duration });
        self.source = Some(source);
    }

    /// Stop and release the current source
    pub(crate) fn stop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop(0.0);
            source.disconnect();
        }
    }

    pub(crate) fn set_rate(&mut self, rate: f64) {
        let now = self.now();
        if let Some(source) = self.source.as_mut() {
            source.set_playback_rate(rate, now);
        }
    }

    pub(crate) fn set_loop(&mut self, looping: bool, loop_range: (f64, f64)) {
        if let Some(source) = self.source.as_mut() {
            source.set_loop(looping, loop_range.0, loop_range.1);
        }
    }

    pub(crate) fn set_gain(&self, value: f32) {
        self.gain.set_value_at_time(value, self.now());
    }

    /// Native linear ramp; smoothing only, the fade ticker stays authoritative
    pub(crate) fn ramp(&self, from: f32, to: f32, len: Duration) {
        let now = self.now();
        self.gain.set_value_at_time(from, now);
        self.gain
            .linear_ramp_to_value_at_time(to, now + len.as_secs_f64());
    }

    pub(crate) fn cancel_ramp(&self) {
        self.gain.cancel_scheduled_values(self.now());
    }

    /// Release everything (pool eviction / unload)
    pub(crate) fn disconnect(&mut self) {
        self.stop();
        self.gain.disconnect();
    }
}

/// Streaming-backend node: one persistent element
pub(crate) struct StreamingVoice {
    pub(crate) element: Box<dyn MediaElement>,
    /// Task waiting for the element to become ready
    pub(crate) watcher: Option<Timer>,
}

impl StreamingVoice {
    pub(crate) fn new(element: Box<dyn MediaElement>) -> Self {
        Self {
            element,
            watcher: None,
        }
    }

    /// Point the element at `src` and start buffering
    pub(crate) fn load(&mut self, src: &str, preload: Preload, volume: f32) {
        self.element.set_source(Some(src));
        self.element.set_volume(volume);
        self.element.load(preload);
    }

    pub(crate) fn ready(&self) -> BackendFuture<f64> {
        self.element.ready()
    }

    /// Live streams report an infinite duration
    pub(crate) fn is_live(&self) -> bool {
        self.element.duration() == Some(f64::INFINITY)
    }

    /// Drop the source so a live stream stops downloading
    pub(crate) fn release_source(&mut self) {
        self.element.set_source(None);
    }

    /// Hand the element back (pool eviction / unload)
    pub(crate) fn into_element(mut self) -> Box<dyn MediaElement> {
        self.watcher = None;
        self.element.pause();
        self.element.set_source(None);
        self.element
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GraphProvider, MediaProvider, VirtualPlatform};

    fn defaults() -> VoiceDefaults {
        VoiceDefaults {
            volume: 0.8,
            muted: false,
            looping: false,
            rate: 1.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_graph_position_follows_device_clock() {
        let platform = VirtualPlatform::new();
        let device = GraphProvider::open(&platform).unwrap();
        let master = device.create_gain(None);
        let node = VoiceNode::Graph(GraphVoice::new(device, &master, 0.8));
        let mut voice = Voice::new(VoiceId::new(1001), VoiceDefaults { rate: 2.0, ..defaults() }, node);

        voice.mark_started(0.5);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!((voice.position() - 1.0).abs() < 1e-6);

        voice.mark_paused(voice.position());
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!((voice.position() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_reset_takes_new_id_and_defaults() {
        let platform = VirtualPlatform::new();
        let node = VoiceNode::Streaming(StreamingVoice::new(platform.create_element()));
        let mut voice = Voice::new(VoiceId::new(1001), defaults(), node);
        voice.volume = 0.1;
        voice.sprite = "hit".to_string();
        voice.paused = false;
        voice.ended = false;

        voice.reset(VoiceId::new(1002), defaults());

        assert_eq!(voice.id, VoiceId::new(1002));
        assert_eq!(voice.volume, 0.8);
        assert_eq!(voice.sprite, DEFAULT_SPRITE);
        assert!(voice.paused && voice.ended);
        assert!(!voice.is_graph());
    }

    #[test]
    fn test_cancel_bumps_fence() {
        let platform = VirtualPlatform::new();
        let node = VoiceNode::Streaming(StreamingVoice::new(platform.create_element()));
        let mut voice = Voice::new(VoiceId::new(1), defaults(), node);
        let first = voice.cancel_end_timer();
        assert_ne!(first, voice.cancel_end_timer());
    }
}
