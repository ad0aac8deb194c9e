//! Source resolution
//!
//! Picks the first candidate source whose container the platform can play.
//! The container comes from the positional format hint when given, else from
//! the source itself: the MIME subtype of a `data:audio/<ext>;` URI or the
//! extension of the path (query string ignored).

use tracing::warn;

/// The source chosen for loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// Source string as given
    pub url: String,
    /// Lower-case container extension
    pub ext: String,
}

/// Extension derived from the source string
pub fn extension_of(src: &str) -> Option<String> {
    let lower = src.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("data:audio/") {
        let end = rest.find([';', ','])?;
        if rest.as_bytes()[end] != b';' || end == 0 {
            return None;
        }
        return Some(rest[..end].to_string());
    }

    let path = lower.split('?').next().unwrap_or_default();
    let (_, ext) = path.rsplit_once('.')?;
    if ext.is_empty() || ext.contains('/') {
        return None;
    }
    Some(ext.to_string())
}

/// First playable candidate
pub fn resolve<F>(sources: &[String], formats: &[String], mut can_play: F) -> Option<ResolvedSource>
where
    F: FnMut(&str) -> bool,
{
    for (i, src) in sources.iter().enumerate() {
        let ext = match formats.get(i) {
            Some(hint) => Some(hint.trim_start_matches('.').to_ascii_lowercase()),
            None => extension_of(src),
        };
        let Some(ext) = ext else {
            warn!(
                "No file extension was found for {}. Consider using the \"format\" property or specify an extension.",
                src
            );
            continue;
        };
        if can_play(&ext) {
            return Some(ResolvedSource {
                url: src.clone(),
                ext,
            });
        }
    }
    None
}
