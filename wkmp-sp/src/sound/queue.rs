//! Deferred operations
//!
//! Operations issued before a sound is ready are recorded as [`Command`]
//! values in an [`ActionQueue`] and replayed in issue order once it is.
//!
//! Each entry carries the event it waits for. The head entry is started,
//! then stays at the head (blocking the entries behind it) until either it
//! completes synchronously or its event is emitted. This keeps a queued
//! `play` ahead of a queued `pause` even when the play has to wait for the
//! device to resume.

use crate::events::EventKind;
use crate::voice::VoiceId;
use std::collections::VecDeque;
use std::time::Duration;

/// A deferred public operation
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start (or resume) a voice reserved at call time
    Play { voice: VoiceId },
    /// Pause one voice or all
    Pause { voice: Option<VoiceId> },
    /// Stop one voice or all
    Stop { voice: Option<VoiceId> },
    /// Set mute
    Mute { muted: bool, voice: Option<VoiceId> },
    /// Set volume
    Volume { volume: f32, voice: Option<VoiceId> },
    /// Run a fade
    Fade {
        from: f32,
        to: f32,
        len: Duration,
        voice: Option<VoiceId>,
    },
    /// Set looping
    Loop { looping: bool, voice: Option<VoiceId> },
    /// Set playback rate
    Rate { rate: f64, voice: Option<VoiceId> },
    /// Move the playback position of one voice (or the first)
    Seek { position: f64, voice: Option<VoiceId> },
}

impl Command {
    /// Event that completes this command
    pub fn tag(&self) -> Option<EventKind> {
        match self {
            Command::Play { .. } => Some(EventKind::Play),
            Command::Pause { .. } => Some(EventKind::Pause),
            Command::Stop { .. } => Some(EventKind::Stop),
            Command::Mute { .. } => Some(EventKind::Mute),
            Command::Volume { .. } => Some(EventKind::Volume),
            Command::Fade { .. } => Some(EventKind::Fade),
            Command::Rate { .. } => Some(EventKind::Rate),
            Command::Seek { .. } => Some(EventKind::Seek),
            Command::Loop { .. } => None,
        }
    }
}

/// How a started command finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    /// Done; pop it and continue with the next entry
    Done,
    /// Waiting for its tag event; keep it at the head
    Pending,
}

#[derive(Debug)]
struct QueuedAction<C> {
    tag: Option<EventKind>,
    command: C,
    in_flight: bool,
}

/// FIFO of deferred commands, each tagged with the event it waits for
#[derive(Debug)]
pub struct ActionQueue<C> {
    items: VecDeque<QueuedAction<C>>,
}

impl<C> Default for ActionQueue<C> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<C: Clone> ActionQueue<C> {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `command`; `tag` of `None` means it completes when run
    pub fn enqueue(&mut self, tag: Option<EventKind>, command: C) {
        self.items.push_back(QueuedAction {
            tag,
            command,
            in_flight: false,
        });
    }

    /// Start the head entry, unless it is already running
    pub fn start_next(&mut self) -> Option<C> {
        let head = self.items.front_mut()?;
        if head.in_flight {
            return None;
        }
        head.in_flight = true;
        Some(head.command.clone())
    }

    /// `event` was emitted: pop the running head if it waits for it
    pub fn complete(&mut self, event: EventKind) -> bool {
        match self.items.front() {
            Some(head) if head.in_flight && head.tag == Some(event) => {
                self.items.pop_front();
                true
            }
            _ => false,
        }
    }

    /// Pop the running head regardless of its tag
    pub fn finish_current(&mut self) -> bool {
        match self.items.front() {
            Some(head) if head.in_flight => {
                self.items.pop_front();
                true
            }
            _ => false,
        }
    }

    /// Whether the head entry is running
    pub fn is_busy(&self) -> bool {
        self.items.front().is_some_and(|h| h.in_flight)
    }

    /// Queued commands in order
    pub fn commands(&self) -> Vec<C> {
        self.items.iter().map(|i| i.command.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
