//! Shared decoded-buffer cache
//!
//! Graph-backend sounds built from the same resolved URL share one decoded
//! buffer. Entries are reference counted by live sounds: `retain` on load,
//! `release` on unload. The entry disappears with its last reference.
//!
//! Concurrent loads of the same URL are coalesced: the first caller runs the
//! fetch+decode, later callers await the same result. A failed load leaves
//! the slot empty so the next caller retries.

use crate::backend::DecodedAudio;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

struct CacheEntry {
    slot: Arc<OnceCell<Arc<DecodedAudio>>>,
    refs: usize,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            slot: Arc::new(OnceCell::new()),
            refs: 0,
        }
    }
}

/// URL-keyed cache of decoded audio
#[derive(Default)]
pub struct BufferCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl BufferCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more sound referencing `key`
    pub fn retain(&self, key: &str) {
        let mut entries = self.entries.lock();
        entries
            .entry(key.to_string())
            .or_insert_with(CacheEntry::new)
            .refs += 1;
    }

    /// Drop one reference; returns `true` when the entry was removed
    pub fn release(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            entries.remove(key);
            debug!("Evicted cached buffer for {}", key);
            return true;
        }
        false
    }

    /// Decoded buffer for `key`, running `load` only if no other caller has
    /// produced (or is producing) it
    pub async fn get_or_load<F, Fut, E>(&self, key: &str, load: F) -> Result<Arc<DecodedAudio>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DecodedAudio, E>>,
    {
        let slot = {
            let mut entries = self.entries.lock();
            entries
                .entry(key.to_string())
                .or_insert_with(CacheEntry::new)
                .slot
                .clone()
        };
        slot.get_or_try_init(|| async { load().await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Decoded buffer, if already present
    pub fn get(&self, key: &str) -> Option<Arc<DecodedAudio>> {
        self.entries
            .lock()
            .get(key)
            .and_then(|e| e.slot.get().cloned())
    }

    /// Live references to `key`
    pub fn refs(&self, key: &str) -> usize {
        self.entries.lock().get(key).map_or(0, |e| e.refs)
    }

    /// Whether an entry (decoded or pending) exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl std::fmt::Debug for BufferCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferCache")
            .field("entries", &self.len())
            .finish()
    }
}
