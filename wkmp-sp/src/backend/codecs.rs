//! Static codec capability table

use super::CodecProbe;
use std::collections::HashSet;

/// Containers the bundled symphonia decoder handles
pub const SYMPHONIA_EXTENSIONS: &[&str] = &[
    "mp3", "mpeg", "ogg", "oga", "wav", "aac", "m4a", "m4b", "mp4", "flac",
];

/// Codec probe answering from a fixed extension list
#[derive(Debug, Clone, Default)]
pub struct CodecTable {
    supported: HashSet<String>,
}

impl CodecTable {
    /// Table containing exactly `extensions` (case-insensitive)
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            supported: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Table matching [`SYMPHONIA_EXTENSIONS`]
    pub fn symphonia() -> Self {
        Self::new(SYMPHONIA_EXTENSIONS.iter().copied())
    }
}

impl CodecProbe for CodecTable {
    fn can_play(&self, ext: &str) -> bool {
        self.supported.contains(&ext.to_ascii_lowercase())
    }
}
