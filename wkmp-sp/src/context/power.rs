//! Device power management
//!
//! The graph device is suspended after it has been idle (no graph voice
//! playing) for `auto_suspend_delay`, and resumed on demand by the next
//! graph start. Only the graph backend is managed; streaming elements have
//! no device to suspend.
//!
//! ```text
//! Running --idle timer--> Suspending --settled--> Suspended
//!    ^                        |                       |
//!    |                resume requested                |
//!    |                        v                       |
//!    +------resumed------ (resume after settle) <-----+
//! ```

use super::PlaybackContext;
use crate::backend::DeviceState;
use crate::error::BackendError;
use crate::timer::Timer;
use tracing::{debug, info, warn};

impl PlaybackContext {
    /// Schedule an idle suspension if no graph voice is playing
    ///
    /// Called after graph voices pause, stop or end. A no-op when automatic
    /// suspension is disabled or the context has no graph device.
    pub fn suspend_idle(&self) {
        if !self.inner.config.auto_suspend {
            return;
        }
        if self.inner.state.lock().graph.is_none() {
            return;
        }

        // Sounds are inspected without the context lock held
        if self
            .live_sounds()
            .iter()
            .any(|sound| sound.has_active_graph_voice())
        {
            return;
        }

        let mut st = self.inner.state.lock();
        st.suspend_seq += 1;
        let seq = st.suspend_seq;
        let delay = self.inner.config.auto_suspend_delay();
        let weak = self.downgrade();
        st.suspend_timer = Some(Timer::once(&self.inner.runtime, delay, move || async move {
            if let Some(ctx) = PlaybackContext::from_weak(&weak) {
                ctx.begin_suspend(seq);
            }
        }));
        debug!("Idle suspension scheduled in {:?}", delay);
    }

    /// Resume a suspended or interrupted device
    ///
    /// Cancels a pending idle suspension when the device is running. When a
    /// suspension is still settling, the resume runs right after it.
    pub fn resume(&self) {
        let mut st = self.inner.state.lock();
        let Some(graph) = st.graph.clone() else {
            return;
        };
        let interrupted = graph.device.state() == DeviceState::Interrupted;

        match st.device_state {
            DeviceState::Running if !interrupted => {
                if st.suspend_timer.take().is_some() {
                    st.suspend_seq += 1;
                    debug!("Pending idle suspension cancelled");
                }
            }
            DeviceState::Running | DeviceState::Suspended | DeviceState::Interrupted => {
                st.suspend_timer = None;
                st.suspend_seq += 1;
                if st.resuming {
                    return;
                }
                st.resuming = true;
                debug!("Resuming audio device");
                let weak = self.downgrade();
                self.inner.runtime.spawn(async move {
                    let result = graph.device.resume().await;
                    if let Some(ctx) = PlaybackContext::from_weak(&weak) {
                        ctx.finish_resume(result);
                    }
                });
            }
            DeviceState::Suspending => {
                st.resume_after_suspend = true;
            }
            DeviceState::Closed => {}
        }
    }

    /// Resume on behalf of a graph start
    pub(crate) fn auto_resume(&self) {
        self.resume();
    }

    /// Run [`suspend_idle`](Self::suspend_idle) outside the caller's locks
    pub(crate) fn request_auto_suspend(&self) {
        if !self.inner.config.auto_suspend {
            return;
        }
        let weak = self.downgrade();
        self.inner.runtime.spawn(async move {
            if let Some(ctx) = PlaybackContext::from_weak(&weak) {
                ctx.suspend_idle();
            }
        });
    }

    fn begin_suspend(&self, seq: u64) {
        let device = {
            let mut st = self.inner.state.lock();
            if st.suspend_seq != seq || st.device_state != DeviceState::Running {
                return;
            }
            st.suspend_timer = None;
            let Some(graph) = &st.graph else {
                return;
            };
            let device = graph.device.clone();
            st.device_state = DeviceState::Suspending;
            device
        };

        info!("Suspending idle audio device");
        let weak = self.downgrade();
        self.inner.runtime.spawn(async move {
            if let Err(e) = device.suspend().await {
                warn!("Audio device suspension failed: {}", e);
            }
            if let Some(ctx) = PlaybackContext::from_weak(&weak) {
                ctx.finish_suspend();
            }
        });
    }

    fn finish_suspend(&self) {
        let resume = {
            let mut st = self.inner.state.lock();
            // The device may have been recreated while settling
            if st.device_state == DeviceState::Suspending {
                st.device_state = DeviceState::Suspended;
            }
            std::mem::take(&mut st.resume_after_suspend)
        };
        debug!("Audio device suspended");
        if resume {
            self.resume();
        }
    }

    fn finish_resume(&self, result: Result<(), BackendError>) {
        let sounds = {
            let mut st = self.inner.state.lock();
            st.resuming = false;
            if let Err(e) = &result {
                warn!("Audio device resume failed: {}", e);
            } else {
                st.device_state = DeviceState::Running;
            }
            st.live_sounds()
        };

        match result {
            Ok(()) => {
                info!("Audio device resumed");
                for sound in sounds {
                    sound.on_context_resume();
                }
            }
            Err(e) => {
                for sound in sounds {
                    sound.on_resume_failed(&e);
                }
            }
        }
    }
}
