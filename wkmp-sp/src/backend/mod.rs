//! Platform backend interfaces
//!
//! The engine never talks to an audio API directly. Everything platform
//! specific sits behind the traits in this module:
//!
//! - [`GraphProvider`] / [`AudioGraph`]: immediate-mode graph backend (gain
//!   nodes, single-use buffer sources, device suspend/resume)
//! - [`MediaProvider`] / [`MediaElement`]: streaming backend (persistent
//!   elements that buffer progressively)
//! - [`CodecProbe`], [`Fetcher`], [`AudioDecoder`]: lookup and I/O collaborators
//!
//! A [`Platform`] bundles one implementation of each. The crate ships a
//! headless [`virtual_device`] implementation plus real fetch/decode/codec
//! collaborators.

pub mod codecs;
pub mod decode;
pub mod fetch;
pub mod virtual_device;

use crate::error::BackendError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use codecs::CodecTable;
pub use decode::SymphoniaDecoder;
pub use fetch::HttpFetcher;
pub use virtual_device::VirtualPlatform;

/// Future returned by asynchronous backend operations
pub type BackendFuture<T> = BoxFuture<'static, std::result::Result<T, BackendError>>;

/// Which backend a sound (and each of its voices) plays through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Immediate-mode audio graph, fully decoded buffers
    Graph,
    /// Media elements with progressive buffering
    Streaming,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Graph => write!(f, "graph"),
            BackendKind::Streaming => write!(f, "streaming"),
        }
    }
}

/// Output device power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    /// Device is producing audio
    #[default]
    Running,
    /// Suspension requested, not yet settled
    Suspending,
    /// Device suspended (power saving)
    Suspended,
    /// Platform interrupted the device (e.g. phone call); needs resume
    Interrupted,
    /// Device closed; a new one must be opened
    Closed,
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceState::Running => write!(f, "running"),
            DeviceState::Suspending => write!(f, "suspending"),
            DeviceState::Suspended => write!(f, "suspended"),
            DeviceState::Interrupted => write!(f, "interrupted"),
            DeviceState::Closed => write!(f, "closed"),
        }
    }
}

/// How eagerly a streaming element buffers its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preload {
    /// Do not load until asked
    None,
    /// Ready once metadata (duration) is known
    Metadata,
    /// Ready once enough data is buffered to play through
    #[default]
    Full,
}

/// Fully decoded sample data, shared by every graph voice of an asset
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved f32 samples
    pub samples: Vec<f32>,
    /// Channel count
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Number of sample frames
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Opens graph devices
pub trait GraphProvider: Send + Sync {
    /// Acquire a new device; failure means the graph backend is unusable
    fn open(&self) -> std::result::Result<Arc<dyn AudioGraph>, BackendError>;
}

/// An open immediate-mode audio device
pub trait AudioGraph: Send + Sync {
    /// Device clock in seconds
    fn current_time(&self) -> f64;

    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// State as reported by the platform
    fn state(&self) -> DeviceState;

    /// Create a gain node routed into `output`, or into the device
    /// destination when `output` is `None`
    fn create_gain(&self, output: Option<&Arc<dyn GainNode>>) -> Arc<dyn GainNode>;

    /// Create a single-use source node playing `buffer` into `output`
    fn create_buffer_source(
        &self,
        buffer: Arc<DecodedAudio>,
        output: &Arc<dyn GainNode>,
    ) -> Box<dyn BufferSourceNode>;

    /// Play a one-frame near-silent buffer; resolves when it has ended
    fn play_scratch(&self) -> BackendFuture<()>;

    /// Suspend the device
    fn suspend(&self) -> BackendFuture<()>;

    /// Resume a suspended or interrupted device
    fn resume(&self) -> BackendFuture<()>;

    /// Close the device permanently
    fn close(&self) -> BackendFuture<()>;
}

/// Gain parameter of a graph node
pub trait GainNode: Send + Sync {
    /// Current (last scheduled) value
    fn value(&self) -> f32;

    /// Set the value at device time `when`
    fn set_value_at_time(&self, value: f32, when: f64);

    /// Schedule a linear ramp ending at device time `end_time`
    fn linear_ramp_to_value_at_time(&self, value: f32, end_time: f64);

    /// Drop every automation event scheduled at or after `from`
    fn cancel_scheduled_values(&self, from: f64);

    /// Disconnect from the graph
    fn disconnect(&self);
}

/// Single-use buffer source node
pub trait BufferSourceNode: Send {
    /// Configure native looping between `loop_start` and `loop_end` seconds
    fn set_loop(&mut self, looping: bool, loop_start: f64, loop_end: f64);

    /// Set playback rate at device time `when`
    fn set_playback_rate(&mut self, rate: f64, when: f64);

    /// Start at device time `when` from `offset` for `duration` seconds
    fn start(&mut self, when: f64, offset: f64, duration: f64);

    /// Stop at device time `when`
    fn stop(&mut self, when: f64);

    /// Disconnect from the graph
    fn disconnect(&mut self);
}

/// Creates streaming elements
pub trait MediaProvider: Send + Sync {
    /// Construct a new element with no source
    fn create_element(&self) -> Box<dyn MediaElement>;
}

/// A persistent streaming element
pub trait MediaElement: Send {
    /// Set (or clear) the element source
    fn set_source(&mut self, src: Option<&str>);

    /// Current source, if any
    fn source(&self) -> Option<String>;

    /// Begin (re)buffering the current source
    fn load(&mut self, preload: Preload);

    /// Resolves with the duration once the element can play, or with
    /// `BackendError::Media(code)` when the source fails
    fn ready(&self) -> BackendFuture<f64>;

    /// Whether enough data is buffered to start without waiting
    fn is_ready(&self) -> bool;

    /// Duration once known; `f64::INFINITY` for live streams
    fn duration(&self) -> Option<f64>;

    /// Playback position in seconds
    fn current_time(&self) -> f64;

    /// Move the playback position
    fn set_current_time(&mut self, seconds: f64);

    /// Element-level volume
    fn volume(&self) -> f32;

    /// Set element-level volume
    fn set_volume(&mut self, volume: f32);

    /// Element-level mute
    fn muted(&self) -> bool;

    /// Set element-level mute
    fn set_muted(&mut self, muted: bool);

    /// Set playback rate
    fn set_playback_rate(&mut self, rate: f64);

    /// Start playback; the future rejects when the platform refuses
    fn play(&mut self) -> BackendFuture<()>;

    /// Pause playback
    fn pause(&mut self);

    /// Whether the element is paused
    fn is_paused(&self) -> bool;

    /// Whether a user gesture has unlocked this element
    fn is_unlocked(&self) -> bool;

    /// Mark the element unlocked
    fn set_unlocked(&mut self, unlocked: bool);
}

/// Answers whether the platform can play a container/extension
pub trait CodecProbe: Send + Sync {
    /// `ext` is lower-case without a leading dot (e.g. `"mp3"`)
    fn can_play(&self, ext: &str) -> bool;
}

/// Request options forwarded to the fetcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// HTTP method
    pub method: String,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// Send cookies / credentials cross-origin
    pub with_credentials: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            headers: Vec::new(),
            with_credentials: false,
        }
    }
}

/// A single fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Resolved source URL or path
    pub url: String,
    /// Request options
    pub options: FetchOptions,
}

/// Retrieves raw bytes for a source
pub trait Fetcher: Send + Sync {
    /// Fetch `request.url`; `BackendError::Fetch` on failure
    fn fetch(&self, request: FetchRequest) -> BackendFuture<Vec<u8>>;
}

/// Turns raw bytes into decoded sample data
pub trait AudioDecoder: Send + Sync {
    /// `hint` is the resolved extension, when known
    fn decode(&self, bytes: Vec<u8>, hint: Option<String>) -> BackendFuture<DecodedAudio>;
}

/// The set of collaborators a playback context runs on
#[derive(Clone)]
pub struct Platform {
    /// Graph backend
    pub graph: Arc<dyn GraphProvider>,
    /// Streaming backend
    pub media: Arc<dyn MediaProvider>,
    /// Codec capability probe
    pub codecs: Arc<dyn CodecProbe>,
    /// Byte fetcher
    pub fetcher: Arc<dyn Fetcher>,
    /// Decoder for graph buffers
    pub decoder: Arc<dyn AudioDecoder>,
}

impl Platform {
    /// Bundle collaborators
    pub fn new(
        graph: Arc<dyn GraphProvider>,
        media: Arc<dyn MediaProvider>,
        codecs: Arc<dyn CodecProbe>,
        fetcher: Arc<dyn Fetcher>,
        decoder: Arc<dyn AudioDecoder>,
    ) -> Self {
        Self {
            graph,
            media,
            codecs,
            fetcher,
            decoder,
        }
    }

    /// Replace the fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the decoder
    pub fn with_decoder(mut self, decoder: Arc<dyn AudioDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Replace the codec probe
    pub fn with_codecs(mut self, codecs: Arc<dyn CodecProbe>) -> Self {
        self.codecs = codecs;
        self
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}
