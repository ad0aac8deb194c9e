//! Pool of reusable streaming elements
//!
//! Platforms that gate playback behind a user gesture only unlock the
//! elements touched during that gesture. The unlock handshake fills this pool
//! with unlocked elements; streaming voices check elements out of it and hand
//! them back when evicted or unloaded. Locked elements are never pooled.

use crate::backend::{MediaElement, MediaProvider};
use tracing::debug;

pub(crate) struct ElementPool {
    idle: Vec<Box<dyn MediaElement>>,
    capacity: usize,
}

impl ElementPool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            idle: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Take an idle element, or create a fresh (possibly locked) one
    pub(crate) fn obtain(&mut self, media: &dyn MediaProvider, unlocked: bool) -> Box<dyn MediaElement> {
        if let Some(element) = self.idle.pop() {
            return element;
        }
        if unlocked {
            debug!("Streaming element pool exhausted, returning potentially locked element");
        }
        media.create_element()
    }

    /// Return an element; locked elements and overflow are dropped
    pub(crate) fn release(&mut self, element: Box<dyn MediaElement>) {
        if element.is_unlocked() && self.idle.len() < self.capacity {
            self.idle.push(element);
        }
    }

    /// Create unlocked elements until the pool is full
    pub(crate) fn fill_unlocked(&mut self, media: &dyn MediaProvider) -> usize {
        let mut created = 0;
        while self.idle.len() < self.capacity {
            let mut element = media.create_element();
            element.set_unlocked(true);
            self.idle.push(element);
            created += 1;
        }
        created
    }

    pub(crate) fn len(&self) -> usize {
        self.idle.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VirtualPlatform;

    #[test]
    fn test_fill_creates_unlocked_elements() {
        let platform = VirtualPlatform::new();
        let mut pool = ElementPool::new(3);

        assert_eq!(pool.fill_unlocked(&platform), 3);
        assert_eq!(pool.fill_unlocked(&platform), 0);
        assert!(platform.elements().iter().all(|e| e.unlocked()));
    }

    #[test]
    fn test_locked_elements_are_not_pooled() {
        let platform = VirtualPlatform::new();
        let mut pool = ElementPool::new(3);

        let element = pool.obtain(&platform, false);
        assert!(!element.is_unlocked());
        pool.release(element);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn test_release_respects_capacity() {
        let platform = VirtualPlatform::new();
        let mut pool = ElementPool::new(1);
        pool.fill_unlocked(&platform);

        let mut extra = platform.create_element();
        extra.set_unlocked(true);
        pool.release(extra);
        assert_eq!(pool.len(), 1);
    }
}
