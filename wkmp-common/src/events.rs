//! Event bus shared by WKMP components
//!
//! A thin wrapper over `tokio::sync::broadcast` that every publisher in the
//! workspace uses for fan-out notification.

use tokio::sync::broadcast;

/// Default channel capacity for event buses
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Broadcast event bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// Publishing never waits on subscribers: the event is placed in every
/// receiver's buffer before `emit` returns, so `try_recv` sees it at once.
///
/// # Examples
///
/// ```
/// use wkmp_common::events::EventBus;
///
/// let bus: EventBus<u32> = EventBus::new(16);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(7);
/// assert_eq!(rx.try_recv().unwrap(), 7);
/// ```
#[derive(Clone)]
pub struct EventBus<E: Clone> {
    tx: broadcast::Sender<E>,
    capacity: usize,
}

impl<E: Clone> EventBus<E> {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///   (clamped to at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: E) -> Result<usize, broadcast::error::SendError<E>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: E) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus: EventBus<&'static str> = EventBus::new(4);
        assert!(bus.emit("lost").is_err());
        // Lossy variant never fails
        bus.emit_lossy("lost");
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus: EventBus<u32> = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        for i in 0..3 {
            bus.emit(i).unwrap();
        }

        for i in 0..3 {
            assert_eq!(a.recv().await.unwrap(), i);
            assert_eq!(b.recv().await.unwrap(), i);
        }
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let bus: EventBus<u8> = EventBus::new(0);
        assert_eq!(bus.capacity(), 1);
    }
}
