//! Cancellable timer handles
//!
//! End-of-clip timers, fade ticks and the idle-suspend countdown are tokio
//! tasks. Dropping or cancelling the handle aborts the task; callers still
//! fence the callback with a generation check because an aborted task may
//! already be waiting on a lock when the abort lands.

use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Owned handle to a scheduled task; aborts on drop
#[derive(Debug)]
pub struct Timer {
    handle: JoinHandle<()>,
}

impl Timer {
    /// Run `f` once after `delay`
    pub fn once<F, Fut>(runtime: &Handle, delay: Duration, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            f().await;
        });
        Self { handle }
    }

    /// Run `future` now, owned like a timer
    pub fn spawn<Fut>(runtime: &Handle, future: Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: runtime.spawn(future),
        }
    }

    /// Call `tick` every `period` until it returns `false`
    ///
    /// The first call happens one `period` after scheduling.
    pub fn every<F>(runtime: &Handle, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let handle = runtime.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !tick() {
                    break;
                }
            }
        });
        Self { handle }
    }

    /// Abort the task
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the task has run to completion (or was aborted)
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
