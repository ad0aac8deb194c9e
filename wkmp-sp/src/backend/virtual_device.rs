//! Headless virtual platform
//!
//! A complete [`Platform`] that produces no sound. Device time follows the
//! tokio clock, so it runs in real time in production and deterministically
//! under `tokio::time::pause()` in tests.
//!
//! Clips are registered by URL with a duration. The fetcher serves a small
//! binary stand-in for each clip and the decoder turns it back into silent
//! samples of the right length; streaming elements read the same registry.
//!
//! Failure injection covers the situations the engine must survive:
//! graph backend unavailable, autoplay blocked, network down, HTTP status
//! errors, undecodable bytes, element errors and anomalous sample rates.

use super::{
    AudioDecoder, AudioGraph, BackendFuture, BufferSourceNode, CodecProbe, DecodedAudio,
    DeviceState, FetchRequest, Fetcher, GainNode, GraphProvider, MediaElement, MediaProvider,
    Platform, Preload,
};
use crate::error::BackendError;
use base64::Engine as _;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Magic prefix of virtual clip bytes
const CLIP_MAGIC: &[u8; 4] = b"VCLP";

/// Sample rate of decoded virtual clips (mono)
const CLIP_SAMPLE_RATE: u32 = 1000;

/// Default extensions the virtual codec probe accepts
const DEFAULT_CODECS: &[&str] = &[
    "mp3", "mpeg", "opus", "ogg", "oga", "wav", "aac", "caf", "m4a", "m4b", "mp4", "weba",
    "webm", "flac",
];

/// A registered clip
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualClip {
    /// Length in seconds (`f64::INFINITY` for a live stream)
    pub duration: f64,
    /// Fetch answers with this HTTP status instead of the bytes
    pub status: Option<u16>,
    /// Bytes are served but cannot be decoded
    pub corrupt: bool,
    /// Streaming elements fail with this media error code
    pub media_error: Option<u16>,
}

impl VirtualClip {
    /// A healthy clip of `duration` seconds
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            status: None,
            corrupt: false,
            media_error: None,
        }
    }
}

/// Platform-wide knobs
#[derive(Debug, Clone)]
struct Settings {
    graph_available: bool,
    sample_rate: u32,
    autoplay_blocked: bool,
    network_down: bool,
    element_latency: Duration,
    device_latency: Duration,
    codecs: HashSet<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            graph_available: true,
            sample_rate: 44100,
            autoplay_blocked: false,
            network_down: false,
            element_latency: Duration::from_millis(20),
            device_latency: Duration::from_millis(5),
            codecs: DEFAULT_CODECS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Default)]
struct Shared {
    settings: Mutex<Settings>,
    clips: Mutex<HashMap<String, VirtualClip>>,
    graphs: Mutex<Vec<Arc<GraphShared>>>,
    elements: Mutex<Vec<Arc<Mutex<ElementShared>>>>,
    fetches: AtomicUsize,
    decodes: AtomicUsize,
    codec_queries: AtomicUsize,
}

impl Shared {
    fn clip_for(&self, src: &str) -> Option<VirtualClip> {
        if let Some(clip) = self.clips.lock().get(src) {
            return Some(clip.clone());
        }
        // Inline sources carry the clip bytes themselves
        let payload = inline_payload(src)?;
        decode_clip_bytes(&payload).map(VirtualClip::new)
    }
}

/// Headless platform with failure injection and inspection probes
#[derive(Clone, Default)]
pub struct VirtualPlatform {
    shared: Arc<Shared>,
}

impl VirtualPlatform {
    /// Platform with a usable graph backend at 44.1 kHz
    pub fn new() -> Self {
        Self::default()
    }

    /// Collaborator bundle for a playback context
    pub fn platform(&self) -> Platform {
        let this = Arc::new(self.clone());
        Platform::new(
            this.clone(),
            this.clone(),
            this.clone(),
            this.clone(),
            this,
        )
    }

    /// Register a clip of `duration` seconds under `url`
    pub fn add_clip(&self, url: &str, duration: f64) {
        self.add_clip_with(url, VirtualClip::new(duration));
    }

    /// Register a clip with explicit failure settings
    pub fn add_clip_with(&self, url: &str, clip: VirtualClip) {
        self.shared.clips.lock().insert(url.to_string(), clip);
    }

    /// Build an inline `data:` source holding a clip of `duration` seconds
    pub fn inline_source(ext: &str, duration: f64) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(encode_clip(duration));
        format!("data:audio/{};base64,{}", ext, encoded)
    }

    /// Make the graph backend unavailable for subsequent opens
    pub fn set_graph_available(&self, available: bool) {
        self.shared.settings.lock().graph_available = available;
    }

    /// Output sample rate of subsequently opened devices
    pub fn set_sample_rate(&self, rate: u32) {
        self.shared.settings.lock().sample_rate = rate;
    }

    /// Refuse element playback until an element is unlocked
    pub fn set_autoplay_blocked(&self, blocked: bool) {
        self.shared.settings.lock().autoplay_blocked = blocked;
    }

    /// Fail every fetch at the network layer
    pub fn set_network_down(&self, down: bool) {
        self.shared.settings.lock().network_down = down;
    }

    /// Time an element needs to become ready after `load`
    pub fn set_element_latency(&self, latency: Duration) {
        self.shared.settings.lock().element_latency = latency;
    }

    /// Replace the supported extension list
    pub fn set_codecs(&self, codecs: &[&str]) {
        self.shared.settings.lock().codecs = codecs.iter().map(|s| s.to_string()).collect();
    }

    /// Number of devices opened so far
    pub fn graphs_opened(&self) -> usize {
        self.shared.graphs.lock().len()
    }

    /// Probe of the most recently opened device
    pub fn graph(&self) -> Option<GraphProbe> {
        self.shared.graphs.lock().last().cloned().map(GraphProbe)
    }

    /// Probes of every element created so far, in creation order
    pub fn elements(&self) -> Vec<ElementProbe> {
        self.shared
            .elements
            .lock()
            .iter()
            .cloned()
            .map(ElementProbe)
            .collect()
    }

    /// Number of fetches issued
    pub fn fetch_count(&self) -> usize {
        self.shared.fetches.load(Ordering::SeqCst)
    }

    /// Number of decodes issued
    pub fn decode_count(&self) -> usize {
        self.shared.decodes.load(Ordering::SeqCst)
    }

    /// Number of codec capability queries
    pub fn codec_queries(&self) -> usize {
        self.shared.codec_queries.load(Ordering::SeqCst)
    }
}

fn encode_clip(duration: f64) -> Vec<u8> {
    let mut bytes = CLIP_MAGIC.to_vec();
    bytes.extend_from_slice(&duration.to_le_bytes());
    bytes
}

fn decode_clip_bytes(bytes: &[u8]) -> Option<f64> {
    if bytes.len() != 12 || &bytes[..4] != CLIP_MAGIC {
        return None;
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[4..]);
    Some(f64::from_le_bytes(raw))
}

fn inline_payload(src: &str) -> Option<Vec<u8>> {
    let rest = src.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    if header.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD.decode(data).ok()
    } else {
        Some(data.as_bytes().to_vec())
    }
}

// ================================================================
// Collaborators
// ================================================================

impl CodecProbe for VirtualPlatform {
    fn can_play(&self, ext: &str) -> bool {
        self.shared.codec_queries.fetch_add(1, Ordering::SeqCst);
        self.shared.settings.lock().codecs.contains(ext)
    }
}

impl Fetcher for VirtualPlatform {
    fn fetch(&self, request: FetchRequest) -> BackendFuture<Vec<u8>> {
        let shared = self.shared.clone();
        async move {
            shared.fetches.fetch_add(1, Ordering::SeqCst);
            let latency = shared.settings.lock().device_latency;
            tokio::time::sleep(latency).await;

            if shared.settings.lock().network_down {
                return Err(BackendError::Fetch {
                    status: None,
                    reason: "network unreachable".to_string(),
                });
            }

            let clip = shared.clips.lock().get(&request.url).cloned();
            match clip {
                None => Err(BackendError::Fetch {
                    status: Some(404),
                    reason: "Not Found".to_string(),
                }),
                Some(VirtualClip {
                    status: Some(status),
                    ..
                }) => Err(BackendError::Fetch {
                    status: Some(status),
                    reason: "server error".to_string(),
                }),
                Some(clip) if clip.corrupt => Ok(b"JUNKJUNKJUNK".to_vec()),
                Some(clip) => Ok(encode_clip(clip.duration)),
            }
        }
        .boxed()
    }
}

impl AudioDecoder for VirtualPlatform {
    fn decode(&self, bytes: Vec<u8>, _hint: Option<String>) -> BackendFuture<DecodedAudio> {
        let shared = self.shared.clone();
        async move {
            shared.decodes.fetch_add(1, Ordering::SeqCst);
            let duration = decode_clip_bytes(&bytes)
                .filter(|d| d.is_finite() && *d >= 0.0)
                .ok_or_else(|| BackendError::Decode("unrecognized audio data".to_string()))?;
            let frames = (duration * CLIP_SAMPLE_RATE as f64).round() as usize;
            Ok(DecodedAudio {
                samples: vec![0.0; frames],
                channels: 1,
                sample_rate: CLIP_SAMPLE_RATE,
            })
        }
        .boxed()
    }
}

// ================================================================
// Graph backend
// ================================================================

struct GraphShared {
    epoch: Instant,
    sample_rate: u32,
    latency: Duration,
    state: Mutex<DeviceState>,
    master: Mutex<Option<Arc<VirtualGain>>>,
    voice_gains: Mutex<Vec<Arc<VirtualGain>>>,
    gains: AtomicUsize,
    sources_started: AtomicUsize,
    sources_playing: AtomicUsize,
    scratch_plays: AtomicUsize,
    suspends: AtomicUsize,
    resumes: AtomicUsize,
}

impl GraphProvider for VirtualPlatform {
    fn open(&self) -> Result<Arc<dyn AudioGraph>, BackendError> {
        let settings = self.shared.settings.lock().clone();
        if !settings.graph_available {
            return Err(BackendError::Unavailable(
                "graph backend disabled on this platform".to_string(),
            ));
        }
        let shared = Arc::new(GraphShared {
            epoch: Instant::now(),
            sample_rate: settings.sample_rate,
            latency: settings.device_latency,
            state: Mutex::new(DeviceState::Running),
            master: Mutex::new(None),
            voice_gains: Mutex::new(Vec::new()),
            gains: AtomicUsize::new(0),
            sources_started: AtomicUsize::new(0),
            sources_playing: AtomicUsize::new(0),
            scratch_plays: AtomicUsize::new(0),
            suspends: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
        });
        self.shared.graphs.lock().push(shared.clone());
        Ok(Arc::new(VirtualGraph { shared }))
    }
}

struct VirtualGraph {
    shared: Arc<GraphShared>,
}

impl AudioGraph for VirtualGraph {
    fn current_time(&self) -> f64 {
        self.shared.epoch.elapsed().as_secs_f64()
    }

    fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    fn state(&self) -> DeviceState {
        *self.shared.state.lock()
    }

    fn create_gain(&self, output: Option<&Arc<dyn GainNode>>) -> Arc<dyn GainNode> {
        self.shared.gains.fetch_add(1, Ordering::SeqCst);
        let gain = Arc::new(VirtualGain::default());
        match output {
            None => *self.shared.master.lock() = Some(gain.clone()),
            Some(_) => self.shared.voice_gains.lock().push(gain.clone()),
        }
        gain
    }

    fn create_buffer_source(
        &self,
        _buffer: Arc<DecodedAudio>,
        _output: &Arc<dyn GainNode>,
    ) -> Box<dyn BufferSourceNode> {
        Box::new(VirtualSource {
            graph: self.shared.clone(),
            playing: false,
        })
    }

    fn play_scratch(&self) -> BackendFuture<()> {
        let shared = self.shared.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            shared.scratch_plays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }

    fn suspend(&self) -> BackendFuture<()> {
        let shared = self.shared.clone();
        async move {
            tokio::time::sleep(shared.latency).await;
            let mut state = shared.state.lock();
            if *state == DeviceState::Closed {
                return Err(BackendError::Device("device closed".to_string()));
            }
            *state = DeviceState::Suspended;
            shared.suspends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }

    fn resume(&self) -> BackendFuture<()> {
        let shared = self.shared.clone();
        async move {
            tokio::time::sleep(shared.latency).await;
            let mut state = shared.state.lock();
            if *state == DeviceState::Closed {
                return Err(BackendError::Device("device closed".to_string()));
            }
            *state = DeviceState::Running;
            shared.resumes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }

    fn close(&self) -> BackendFuture<()> {
        let shared = self.shared.clone();
        async move {
            *shared.state.lock() = DeviceState::Closed;
            Ok(())
        }
        .boxed()
    }
}

#[derive(Debug)]
struct VirtualGain {
    value: Mutex<f32>,
    ramp: Mutex<Option<(f32, f64)>>,
    connected: AtomicBool,
}

impl Default for VirtualGain {
    fn default() -> Self {
        Self {
            value: Mutex::new(1.0),
            ramp: Mutex::new(None),
            connected: AtomicBool::new(true),
        }
    }
}

impl GainNode for VirtualGain {
    fn value(&self) -> f32 {
        *self.value.lock()
    }

    fn set_value_at_time(&self, value: f32, _when: f64) {
        *self.value.lock() = value;
    }

    fn linear_ramp_to_value_at_time(&self, value: f32, end_time: f64) {
        *self.ramp.lock() = Some((value, end_time));
    }

    fn cancel_scheduled_values(&self, _from: f64) {
        *self.ramp.lock() = None;
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

struct VirtualSource {
    graph: Arc<GraphShared>,
    playing: bool,
}

impl VirtualSource {
    fn halt(&mut self) {
        if self.playing {
            self.playing = false;
            self.graph.sources_playing.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl BufferSourceNode for VirtualSource {
    fn set_loop(&mut self, _looping: bool, _loop_start: f64, _loop_end: f64) {}

    fn set_playback_rate(&mut self, _rate: f64, _when: f64) {}

    fn start(&mut self, _when: f64, _offset: f64, _duration: f64) {
        if !self.playing {
            self.playing = true;
            self.graph.sources_started.fetch_add(1, Ordering::SeqCst);
            self.graph.sources_playing.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn stop(&mut self, _when: f64) {
        self.halt();
    }

    fn disconnect(&mut self) {
        self.halt();
    }
}

impl Drop for VirtualSource {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Inspection handle for a virtual graph device
#[derive(Clone)]
pub struct GraphProbe(Arc<GraphShared>);

impl GraphProbe {
    /// Device state
    pub fn state(&self) -> DeviceState {
        *self.0.state.lock()
    }

    /// Simulate a platform interruption
    pub fn interrupt(&self) {
        *self.0.state.lock() = DeviceState::Interrupted;
    }

    /// Master gain value (`None` before the master node exists)
    pub fn master_gain(&self) -> Option<f32> {
        self.0.master.lock().as_ref().map(|g| g.value())
    }

    /// Target of the master gain's pending ramp, if any
    pub fn master_ramp(&self) -> Option<(f32, f64)> {
        self.0.master.lock().as_ref().and_then(|g| *g.ramp.lock())
    }

    /// Values of the still-connected voice gains, in creation order
    pub fn voice_gains(&self) -> Vec<f32> {
        self.0
            .voice_gains
            .lock()
            .iter()
            .filter(|g| g.connected.load(Ordering::SeqCst))
            .map(|g| g.value())
            .collect()
    }

    /// Pending ramps of the still-connected voice gains
    pub fn voice_ramps(&self) -> Vec<Option<(f32, f64)>> {
        self.0
            .voice_gains
            .lock()
            .iter()
            .filter(|g| g.connected.load(Ordering::SeqCst))
            .map(|g| *g.ramp.lock())
            .collect()
    }

    /// Gain nodes created on this device (master included)
    pub fn gains_created(&self) -> usize {
        self.0.gains.load(Ordering::SeqCst)
    }

    /// Buffer sources ever started
    pub fn sources_started(&self) -> usize {
        self.0.sources_started.load(Ordering::SeqCst)
    }

    /// Buffer sources currently playing
    pub fn sources_playing(&self) -> usize {
        self.0.sources_playing.load(Ordering::SeqCst)
    }

    /// Near-silent unlock buffers played
    pub fn scratch_plays(&self) -> usize {
        self.0.scratch_plays.load(Ordering::SeqCst)
    }

    /// Completed suspensions
    pub fn suspends(&self) -> usize {
        self.0.suspends.load(Ordering::SeqCst)
    }

    /// Completed resumptions
    pub fn resumes(&self) -> usize {
        self.0.resumes.load(Ordering::SeqCst)
    }
}

// ================================================================
// Streaming backend
// ================================================================

#[derive(Debug)]
struct ElementShared {
    src: Option<String>,
    clip: Option<VirtualClip>,
    ready_at: Option<Instant>,
    position: f64,
    playing_since: Option<Instant>,
    volume: f32,
    muted: bool,
    rate: f64,
    unlocked: bool,
    plays: usize,
    loads: usize,
}

impl ElementShared {
    fn new() -> Self {
        Self {
            src: None,
            clip: None,
            ready_at: None,
            position: 0.0,
            playing_since: None,
            volume: 1.0,
            muted: false,
            rate: 1.0,
            unlocked: false,
            plays: 0,
            loads: 0,
        }
    }

    fn is_ready(&self) -> bool {
        match (&self.clip, self.ready_at) {
            (Some(clip), Some(at)) => clip.media_error.is_none() && Instant::now() >= at,
            _ => false,
        }
    }

    fn position_now(&self) -> f64 {
        let base = match self.playing_since {
            Some(since) => self.position + since.elapsed().as_secs_f64() * self.rate.abs(),
            None => self.position,
        };
        match &self.clip {
            Some(clip) => base.min(clip.duration),
            None => base,
        }
    }
}

impl MediaProvider for VirtualPlatform {
    fn create_element(&self) -> Box<dyn MediaElement> {
        let element = Arc::new(Mutex::new(ElementShared::new()));
        self.shared.elements.lock().push(element.clone());
        Box::new(VirtualElement {
            element,
            platform: self.shared.clone(),
        })
    }
}

struct VirtualElement {
    element: Arc<Mutex<ElementShared>>,
    platform: Arc<Shared>,
}

impl MediaElement for VirtualElement {
    fn set_source(&mut self, src: Option<&str>) {
        let mut el = self.element.lock();
        el.src = src.map(str::to_string);
        el.clip = None;
        el.ready_at = None;
        el.position = 0.0;
        el.playing_since = None;
    }

    fn source(&self) -> Option<String> {
        self.element.lock().src.clone()
    }

    fn load(&mut self, preload: Preload) {
        let latency = self.platform.settings.lock().element_latency;
        let mut el = self.element.lock();
        let Some(src) = el.src.clone() else {
            return;
        };
        el.loads += 1;
        el.clip = Some(self.platform.clip_for(&src).unwrap_or(VirtualClip {
            duration: 0.0,
            status: None,
            corrupt: false,
            media_error: Some(4), // MEDIA_ERR_SRC_NOT_SUPPORTED
        }));
        let latency = match preload {
            Preload::Metadata => latency / 2,
            _ => latency,
        };
        el.ready_at = Some(Instant::now() + latency);
    }

    fn ready(&self) -> BackendFuture<f64> {
        let element = self.element.clone();
        async move {
            let ready_at = element.lock().ready_at;
            let Some(at) = ready_at else {
                return Err(BackendError::Media(1)); // MEDIA_ERR_ABORTED
            };
            tokio::time::sleep_until(at).await;
            let el = element.lock();
            match &el.clip {
                Some(clip) => match clip.media_error {
                    Some(code) => Err(BackendError::Media(code)),
                    None => Ok(clip.duration),
                },
                None => Err(BackendError::Media(1)),
            }
        }
        .boxed()
    }

    fn is_ready(&self) -> bool {
        self.element.lock().is_ready()
    }

    fn duration(&self) -> Option<f64> {
        let el = self.element.lock();
        if el.is_ready() {
            el.clip.as_ref().map(|c| c.duration)
        } else {
            None
        }
    }

    fn current_time(&self) -> f64 {
        self.element.lock().position_now()
    }

    fn set_current_time(&mut self, seconds: f64) {
        let mut el = self.element.lock();
        el.position = seconds.max(0.0);
        if el.playing_since.is_some() {
            el.playing_since = Some(Instant::now());
        }
    }

    fn volume(&self) -> f32 {
        self.element.lock().volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.element.lock().volume = volume.clamp(0.0, 1.0);
    }

    fn muted(&self) -> bool {
        self.element.lock().muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.element.lock().muted = muted;
    }

    fn set_playback_rate(&mut self, rate: f64) {
        let mut el = self.element.lock();
        el.position = el.position_now();
        if el.playing_since.is_some() {
            el.playing_since = Some(Instant::now());
        }
        el.rate = rate;
    }

    fn play(&mut self) -> BackendFuture<()> {
        let blocked = self.platform.settings.lock().autoplay_blocked;
        let mut el = self.element.lock();
        if blocked && !el.unlocked {
            return async { Err(BackendError::PlayRejected("NotAllowedError".to_string())) }
                .boxed();
        }
        if el.playing_since.is_none() {
            el.playing_since = Some(Instant::now());
        }
        el.plays += 1;
        async { Ok(()) }.boxed()
    }

    fn pause(&mut self) {
        let mut el = self.element.lock();
        el.position = el.position_now();
        el.playing_since = None;
    }

    fn is_paused(&self) -> bool {
        let el = self.element.lock();
        // An element that ran off the end of its clip reports paused
        let at_end = el.clip.as_ref().is_some_and(|c| el.position_now() >= c.duration);
        el.playing_since.is_none() || at_end
    }

    fn is_unlocked(&self) -> bool {
        self.element.lock().unlocked
    }

    fn set_unlocked(&mut self, unlocked: bool) {
        self.element.lock().unlocked = unlocked;
    }
}

/// Inspection handle for a virtual streaming element
#[derive(Clone)]
pub struct ElementProbe(Arc<Mutex<ElementShared>>);

impl ElementProbe {
    /// Current source
    pub fn source(&self) -> Option<String> {
        self.0.lock().src.clone()
    }

    /// Element-level volume
    pub fn volume(&self) -> f32 {
        self.0.lock().volume
    }

    /// Element-level mute
    pub fn muted(&self) -> bool {
        self.0.lock().muted
    }

    /// Whether the element is paused
    pub fn paused(&self) -> bool {
        self.0.lock().playing_since.is_none()
    }

    /// Whether the element was unlocked
    pub fn unlocked(&self) -> bool {
        self.0.lock().unlocked
    }

    /// Successful `play` calls
    pub fn plays(&self) -> usize {
        self.0.lock().plays
    }

    /// `load` calls with a source set
    pub fn loads(&self) -> usize {
        self.0.lock().loads
    }

    /// Playback rate
    pub fn rate(&self) -> f64 {
        self.0.lock().rate
    }

    /// Playback position
    pub fn position(&self) -> f64 {
        self.0.lock().position_now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_source_round_trips_through_registry_lookup() {
        let platform = VirtualPlatform::new();
        let src = VirtualPlatform::inline_source("wav", 1.5);
        assert!(src.starts_with("data:audio/wav;base64,"));
        assert_eq!(platform.shared.clip_for(&src).map(|c| c.duration), Some(1.5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_element_becomes_ready_after_latency() {
        let platform = VirtualPlatform::new();
        platform.add_clip("a.mp3", 2.0);

        let mut element = platform.create_element();
        element.set_source(Some("a.mp3"));
        element.load(Preload::Full);
        assert!(!element.is_ready());

        let duration = element.ready().await.unwrap();
        assert_eq!(duration, 2.0);
        assert!(element.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_element_source_errors() {
        let platform = VirtualPlatform::new();
        let mut element = platform.create_element();
        element.set_source(Some("missing.mp3"));
        element.load(Preload::Full);
        assert_eq!(element.ready().await, Err(BackendError::Media(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_autoplay_rejects_until_unlocked() {
        let platform = VirtualPlatform::new();
        platform.set_autoplay_blocked(true);
        let mut element = platform.create_element();

        assert!(element.play().await.is_err());
        element.set_unlocked(true);
        assert!(element.play().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_and_resume_update_state() {
        let platform = VirtualPlatform::new();
        let graph = GraphProvider::open(&platform).unwrap();

        graph.suspend().await.unwrap();
        assert_eq!(graph.state(), DeviceState::Suspended);
        graph.resume().await.unwrap();
        assert_eq!(graph.state(), DeviceState::Running);
        assert_eq!(platform.graph().unwrap().resumes(), 1);
    }

    #[tokio::test]
    async fn test_graph_unavailable() {
        let platform = VirtualPlatform::new();
        platform.set_graph_available(false);
        assert!(GraphProvider::open(&platform).is_err());
    }
}
