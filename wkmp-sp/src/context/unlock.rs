//! Gesture unlock handshake
//!
//! Some platforms refuse to produce audio until a user gesture has touched
//! the output. The handshake is armed once (by the first sound when
//! `auto_unlock` is set, or explicitly) and completes on the first gesture:
//!
//! 1. fill the element pool with unlocked streaming elements
//! 2. unlock and reload every locked streaming voice element
//! 3. resume the graph device
//! 4. play a one-frame near-silent buffer through the graph
//! 5. mark unlocked and emit `unlock` on every sound
//!
//! The host forwards gestures with [`PlaybackContext::notify_gesture`].

use super::PlaybackContext;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// User interactions that may unlock audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gesture {
    /// Touch ended
    Touch,
    /// Mouse click
    Click,
    /// Key released
    Key,
}

#[derive(Debug, Default)]
pub(crate) struct UnlockState {
    pub(crate) armed: bool,
    pub(crate) in_progress: bool,
    pub(crate) unlocked: bool,
    /// The output sample rate has been checked
    pub(crate) rate_checked: bool,
}

impl PlaybackContext {
    /// Whether the unlock handshake has completed
    pub fn is_unlocked(&self) -> bool {
        self.inner.state.lock().unlock.unlocked
    }

    /// Whether the handshake is waiting for a gesture
    pub fn is_unlock_armed(&self) -> bool {
        self.inner.state.lock().unlock.armed
    }

    /// Arm the handshake
    ///
    /// Idempotent, and a no-op once unlocked. The first arming also checks
    /// the device sample rate: a rate other than `expected_sample_rate`
    /// recreates the device (and unloads every sound) once.
    pub fn unlock(&self) {
        let rate_mismatch = {
            let mut st = self.inner.state.lock();
            if st.unlock.unlocked || st.unlock.armed {
                return;
            }
            st.unlock.armed = true;

            let expected = self.inner.config.expected_sample_rate;
            let mismatch = match &st.graph {
                Some(graph) if !st.unlock.rate_checked && expected != 0 => {
                    let actual = graph.device.sample_rate();
                    (actual != expected).then_some(actual)
                }
                _ => None,
            };
            st.unlock.rate_checked = true;
            mismatch
        };

        if let Some(actual) = rate_mismatch {
            warn!(
                "Output sample rate {} Hz differs from expected {} Hz, recreating audio device",
                actual, self.inner.config.expected_sample_rate
            );
            self.unload();
        }
        debug!("Unlock handshake armed");
    }

    /// Forward a user gesture
    ///
    /// Completes the handshake when armed. Gestures arriving before arming,
    /// during a handshake or after unlocking are ignored.
    pub fn notify_gesture(&self, gesture: Gesture) {
        let (graph, sounds) = {
            let mut st = self.inner.state.lock();
            if !st.unlock.armed || st.unlock.unlocked || st.unlock.in_progress {
                return;
            }
            st.unlock.in_progress = true;
            let created = st
                .elements
                .fill_unlocked(self.inner.platform.media.as_ref());
            debug!("Unlocking audio on {:?} ({} pooled elements created)", gesture, created);
            (st.graph.clone(), st.live_sounds())
        };

        for sound in &sounds {
            sound.unlock_elements();
        }
        self.auto_resume();

        let Some(graph) = graph else {
            self.finish_unlock();
            return;
        };

        let weak = self.downgrade();
        self.inner.runtime.spawn(async move {
            let result = graph.device.play_scratch().await;
            let Some(ctx) = PlaybackContext::from_weak(&weak) else {
                return;
            };
            match result {
                Ok(()) => ctx.finish_unlock(),
                Err(e) => {
                    warn!("Unlock buffer failed to play, waiting for another gesture: {}", e);
                    ctx.inner.state.lock().unlock.in_progress = false;
                }
            }
        });
    }

    fn finish_unlock(&self) {
        let sounds = {
            let mut st = self.inner.state.lock();
            st.unlock.unlocked = true;
            st.unlock.armed = false;
            st.unlock.in_progress = false;
            st.live_sounds()
        };
        info!("Audio unlocked");
        for sound in sounds {
            sound.emit_unlock();
        }
    }
}
