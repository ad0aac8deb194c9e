//! Error types for wkmp-sp
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//!
//! Load and play failures are never returned across the public `Sound` API;
//! they are delivered as `loaderror` / `playerror` events whose message is the
//! `Display` text of [`LoadError`] / [`PlayError`].

use thiserror::Error;

/// Main error type for wkmp-sp
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid descriptor or context configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Asset could not be loaded
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Voice could not start
    #[error("Play error: {0}")]
    Play(#[from] PlayError),

    /// Platform backend failure
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared configuration layer errors
    #[error(transparent)]
    Common(#[from] wkmp_common::Error),
}

/// Convenience Result type using wkmp-sp Error
pub type Result<T> = std::result::Result<T, Error>;

/// Why an asset (or one of its voices) failed to load
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    /// None of the candidate sources has a playable container
    #[error("No codec support for selected audio sources.")]
    NoCodecSupport,

    /// Server answered with a non-success status
    #[error("Failed loading audio file with status: {0}.")]
    Status(u16),

    /// Transport-level failure (no HTTP status)
    #[error("Failed loading audio file: {0}")]
    Network(String),

    /// Inline `data:` source could not be decoded
    #[error("Invalid inline audio data: {0}")]
    InlineData(String),

    /// Decoder rejected the fetched bytes
    #[error("Decoding audio data failed: {0}")]
    Decode(String),

    /// Streaming element reported an error code
    #[error("{0}")]
    Media(u16),
}

impl LoadError {
    /// Numeric code surfaced with element errors (0 when not applicable)
    pub fn code(&self) -> Option<u16> {
        match self {
            LoadError::Media(code) => Some(*code),
            LoadError::Status(status) => Some(*status),
            _ => None,
        }
    }
}

/// Why a voice could not start playing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayError {
    /// Start refused, most commonly an autoplay/gesture restriction
    #[error("Playback was unable to start. This is most commonly an issue on mobile devices and Chrome where playback was not within a user interaction.")]
    Blocked,

    /// Backend-specific refusal
    #[error("{0}")]
    Backend(String),
}

/// Failures reported by platform collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Backend cannot be acquired on this platform
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Fetch failed; `status` is set when the server answered
    #[error("fetch failed ({status:?}): {reason}")]
    Fetch {
        /// HTTP status, `None` for network-layer failures
        status: Option<u16>,
        /// Human-readable reason
        reason: String,
    },

    /// Decoder rejected the input
    #[error("decode failed: {0}")]
    Decode(String),

    /// Media element error code (1 aborted, 2 network, 3 decode, 4 unsupported)
    #[error("media error code {0}")]
    Media(u16),

    /// Platform refused to start playback
    #[error("play rejected: {0}")]
    PlayRejected(String),

    /// Device suspend/resume/close failure
    #[error("device error: {0}")]
    Device(String),
}

impl From<BackendError> for LoadError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Fetch {
                status: Some(status),
                ..
            } => LoadError::Status(status),
            BackendError::Fetch { status: None, reason } => LoadError::Network(reason),
            BackendError::Decode(reason) => LoadError::Decode(reason),
            BackendError::Media(code) => LoadError::Media(code),
            other => LoadError::Network(other.to_string()),
        }
    }
}

impl From<BackendError> for PlayError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PlayRejected(_) => PlayError::Blocked,
            other => PlayError::Backend(other.to_string()),
        }
    }
}
