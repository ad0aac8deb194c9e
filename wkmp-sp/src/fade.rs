//! Volume fade scheduling
//!
//! A fade is a linear ramp from `from` to `to` over `len`, advanced by a
//! periodic tick. The tick interval comes from a fixed 0.01 volume step:
//!
//! ```text
//! steps    = |to - from| / 0.01
//! interval = max(4 ms, len / steps)
//! ```
//!
//! Each tick advances the volume in proportion to the real time elapsed since
//! the previous tick (so a late tick catches up), rounds to 0.01 and clamps at
//! the target. The final tick always lands exactly on `to`.
//!
//! The scheduler holds no timer itself. The owning sound drives it from a
//! [`crate::timer::Timer`] and applies the returned volumes to its voices;
//! on the graph backend the same fade is also written as a native ramp, which
//! only smooths the audible result between ticks.

use std::time::Duration;

/// Volume granularity of one fade step
pub const FADE_STEP: f32 = 0.01;

/// Shortest tick interval
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(4);

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeStep {
    /// Intermediate volume
    Progress(f32),
    /// Final volume (always equal to the target); no further ticks
    Done(f32),
}

impl FadeStep {
    /// Volume carried by the step
    pub fn volume(&self) -> f32 {
        match self {
            FadeStep::Progress(v) | FadeStep::Done(v) => *v,
        }
    }

    /// Whether this was the final step
    pub fn is_done(&self) -> bool {
        matches!(self, FadeStep::Done(_))
    }
}

/// Linear fade state for one voice
#[derive(Debug, Clone, PartialEq)]
pub struct FadeScheduler {
    from: f32,
    to: f32,
    len: Duration,
    elapsed: Duration,
    current: f32,
    done: bool,
}

impl FadeScheduler {
    /// New fade; `from` and `to` are clamped to [0.0, 1.0]
    pub fn new(from: f32, to: f32, len: Duration) -> Self {
        let from = from.clamp(0.0, 1.0);
        let to = to.clamp(0.0, 1.0);
        Self {
            from,
            to,
            len,
            elapsed: Duration::ZERO,
            current: from,
            done: false,
        }
    }

    /// Number of 0.01 steps between `from` and `to`
    pub fn steps(&self) -> f32 {
        ((self.to - self.from) / FADE_STEP).abs()
    }

    /// Tick interval, never longer than the fade itself
    pub fn interval(&self) -> Duration {
        let steps = self.steps();
        let step_len = if steps > 1.0 {
            self.len.div_f32(steps)
        } else {
            self.len
        };
        step_len.max(MIN_TICK_INTERVAL)
    }

    /// Advance by `since_last_tick`
    ///
    /// Ticking a finished fade keeps returning `Done(to)`.
    pub fn tick(&mut self, since_last_tick: Duration) -> FadeStep {
        if self.done {
            return FadeStep::Done(self.to);
        }
        self.elapsed += since_last_tick;

        let diff = self.to - self.from;
        if diff == 0.0 || self.len.is_zero() || self.elapsed >= self.len {
            return self.finish();
        }

        let fraction = since_last_tick.as_secs_f32() / self.len.as_secs_f32();
        let mut volume = self.current + diff * fraction;
        volume = (volume * 100.0).round() / 100.0;
        volume = if diff < 0.0 {
            volume.max(self.to)
        } else {
            volume.min(self.to)
        };

        if (diff < 0.0 && volume <= self.to) || (diff > 0.0 && volume >= self.to) {
            return self.finish();
        }
        self.current = volume;
        FadeStep::Progress(volume)
    }

    /// Jump to the target and mark the fade finished
    pub fn finish(&mut self) -> FadeStep {
        self.current = self.to;
        self.done = true;
        FadeStep::Done(self.to)
    }

    /// Start volume
    pub fn from(&self) -> f32 {
        self.from
    }

    /// Target volume
    pub fn to(&self) -> f32 {
        self.to
    }

    /// Fade length
    pub fn len(&self) -> Duration {
        self.len
    }

    /// Most recent volume
    pub fn current(&self) -> f32 {
        self.current
    }

    /// Whether the target has been reached
    pub fn is_done(&self) -> bool {
        self.done
    }
}
