//! Sound events and listener dispatch
//!
//! Every state change of a sound or voice is reported as a [`SoundEvent`].
//! Delivery has two channels:
//!
//! - **Callbacks** registered with `on` / `once`, filtered per voice id.
//!   Matching callbacks are captured when the event is emitted and run later
//!   on the context's dispatcher task, never inside the triggering call.
//! - **Subscriptions** (`Sound::subscribe`), a broadcast stream of every event
//!   of one sound.
//!
//! Callbacks of one sound run in emission order. Events of different sounds
//! share the dispatcher but callers should not rely on cross-sound ordering.

use crate::sound::SoundKey;
use crate::voice::VoiceId;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::error;

/// Event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Asset finished loading (always delivered, regardless of voice filter)
    Load,
    /// Asset or voice failed to load
    LoadError,
    /// Voice failed to start
    PlayError,
    /// Voice started
    Play,
    /// Voice reached the end of its clip (once per loop iteration)
    End,
    /// Voice paused
    Pause,
    /// Voice stopped
    Stop,
    /// Mute changed
    Mute,
    /// Volume changed
    Volume,
    /// Rate changed
    Rate,
    /// Seek completed
    Seek,
    /// Fade finished
    Fade,
    /// Unlock handshake completed
    Unlock,
    /// Output device resumed
    Resume,
}

impl EventKind {
    /// Lower-case event name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Load => "load",
            EventKind::LoadError => "loaderror",
            EventKind::PlayError => "playerror",
            EventKind::Play => "play",
            EventKind::End => "end",
            EventKind::Pause => "pause",
            EventKind::Stop => "stop",
            EventKind::Mute => "mute",
            EventKind::Volume => "volume",
            EventKind::Rate => "rate",
            EventKind::Seek => "seek",
            EventKind::Fade => "fade",
            EventKind::Unlock => "unlock",
            EventKind::Resume => "resume",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One emitted event
#[derive(Debug, Clone, PartialEq)]
pub struct SoundEvent {
    /// Event name
    pub kind: EventKind,
    /// Sound that emitted the event
    pub sound: SoundKey,
    /// Voice concerned, if any
    pub voice: Option<VoiceId>,
    /// Error message for `loaderror` / `playerror`
    pub message: Option<String>,
    /// Error code for element failures and HTTP statuses
    pub code: Option<u16>,
}

impl SoundEvent {
    /// Event without message
    pub fn new(kind: EventKind, sound: SoundKey, voice: Option<VoiceId>) -> Self {
        Self {
            kind,
            sound,
            voice,
            message: None,
            code: None,
        }
    }
}

/// Listener callback
pub type Callback = Arc<dyn Fn(&SoundEvent) + Send + Sync>;

/// Handle returned by `on` / `once`, used to remove a single listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    kind: EventKind,
    voice: Option<VoiceId>,
    once: bool,
    callback: Callback,
}

/// Per-sound listener registry
#[derive(Default)]
pub(crate) struct Listeners {
    entries: Vec<Listener>,
    next_id: u64,
}

impl Listeners {
    /// Register a listener; `voice` restricts it to one voice id
    pub(crate) fn add(
        &mut self,
        kind: EventKind,
        callback: Callback,
        voice: Option<VoiceId>,
        once: bool,
    ) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push(Listener {
            id,
            kind,
            voice,
            once,
            callback,
        });
        id
    }

    /// Remove every listener matching all given filters
    ///
    /// `None` filters match anything, so `remove(None, None, None)` clears
    /// the registry and `remove(Some(kind), None, None)` clears one event.
    pub(crate) fn remove(
        &mut self,
        kind: Option<EventKind>,
        listener: Option<ListenerId>,
        voice: Option<VoiceId>,
    ) -> usize {
        let before = self.entries.len();
        self.entries.retain(|l| {
            let matches = kind.map_or(true, |k| l.kind == k)
                && listener.map_or(true, |id| l.id == id)
                && voice.map_or(true, |v| l.voice == Some(v));
            !matches
        });
        before - self.entries.len()
    }

    /// Callbacks that should see `event`, in registration order
    ///
    /// One-shot listeners are removed as they are captured.
    pub(crate) fn take_matching(&mut self, event: &SoundEvent) -> Vec<Callback> {
        let mut callbacks = Vec::new();
        self.entries.retain(|l| {
            let matches = l.kind == event.kind
                && (l.voice.is_none() || l.voice == event.voice || event.kind == EventKind::Load);
            if matches {
                callbacks.push(l.callback.clone());
            }
            !(matches && l.once)
        });
        callbacks
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

struct Dispatch {
    callbacks: Vec<Callback>,
    event: SoundEvent,
}

/// Runs listener callbacks off the caller's stack
#[derive(Clone)]
pub(crate) struct EventDispatcher {
    tx: mpsc::UnboundedSender<Dispatch>,
}

impl EventDispatcher {
    /// Spawn the dispatcher task on `runtime`
    pub(crate) fn spawn(runtime: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Dispatch>();
        runtime.spawn(async move {
            while let Some(dispatch) = rx.recv().await {
                for callback in &dispatch.callbacks {
                    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                        callback(&dispatch.event)
                    }));
                    if result.is_err() {
                        error!(
                            "Listener for '{}' on sound {} panicked",
                            dispatch.event.kind, dispatch.event.sound
                        );
                    }
                }
            }
        });
        Self { tx }
    }

    /// Queue callbacks for later execution
    pub(crate) fn dispatch(&self, callbacks: Vec<Callback>, event: SoundEvent) {
        if callbacks.is_empty() {
            return;
        }
        // Receiver only disappears when the runtime shuts down
        let _ = self.tx.send(Dispatch { callbacks, event });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        (hits, Arc::new(move |_e: &SoundEvent| {
            h.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn event(kind: EventKind, voice: Option<u64>) -> SoundEvent {
        SoundEvent::new(kind, SoundKey::new(1), voice.map(VoiceId::new))
    }

    #[test]
    fn test_voice_filter() {
        let mut listeners = Listeners::default();
        let (_, cb) = counter();
        listeners.add(EventKind::End, cb.clone(), Some(VoiceId::new(1001)), false);
        listeners.add(EventKind::End, cb, None, false);

        assert_eq!(listeners.take_matching(&event(EventKind::End, Some(1001))).len(), 2);
        assert_eq!(listeners.take_matching(&event(EventKind::End, Some(1002))).len(), 1);
        assert_eq!(listeners.take_matching(&event(EventKind::Play, Some(1001))).len(), 0);
    }

    #[test]
    fn test_load_ignores_voice_filter() {
        let mut listeners = Listeners::default();
        let (_, cb) = counter();
        listeners.add(EventKind::Load, cb, Some(VoiceId::new(1001)), false);
        assert_eq!(listeners.take_matching(&event(EventKind::Load, None)).len(), 1);
    }

    #[test]
    fn test_once_listener_removed_after_capture() {
        let mut listeners = Listeners::default();
        let (_, cb) = counter();
        listeners.add(EventKind::Play, cb, None, true);

        assert_eq!(listeners.take_matching(&event(EventKind::Play, Some(1))).len(), 1);
        assert_eq!(listeners.take_matching(&event(EventKind::Play, Some(1))).len(), 0);
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn test_remove_filters() {
        let mut listeners = Listeners::default();
        let (_, cb) = counter();
        let a = listeners.add(EventKind::Play, cb.clone(), None, false);
        listeners.add(EventKind::Play, cb.clone(), Some(VoiceId::new(7)), false);
        listeners.add(EventKind::End, cb, None, false);

        assert_eq!(listeners.remove(Some(EventKind::Play), Some(a), None), 1);
        assert_eq!(listeners.remove(Some(EventKind::Play), None, Some(VoiceId::new(7))), 1);
        assert_eq!(listeners.remove(None, None, None), 1);
        assert_eq!(listeners.len(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_is_asynchronous() {
        let dispatcher = EventDispatcher::spawn(&Handle::current());
        let (hits, cb) = counter();

        dispatcher.dispatch(vec![cb], event(EventKind::Play, Some(1)));
        // Nothing ran inside dispatch()
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
