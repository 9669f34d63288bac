//! Distribution tick policy: which buffer goes out on each tick.
//!
//! The relay sends a frame to every viewer at a fixed rate whether or not the
//! camera delivered anything new.  Each tick ages the idle counter by one; once
//! it reaches the threshold the camera is considered gone and the fallback
//! image is served instead of the last committed frame.  Only a commit (see
//! [`crate::domain::reassembly`]) resets the counter.

use std::time::Duration;

use crate::domain::buffers::{BufferStore, Slot};

/// Default tick rate.
pub const DEFAULT_FRAMES_PER_SECOND: u32 = 25;

/// Default number of ticks without a commit before the fallback is served
/// (two seconds at the default rate).
pub const DEFAULT_IDLE_THRESHOLD: u32 = 50;

/// The buffer selected for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    /// The active double-buffer slot.
    Live(Slot),
    /// The placeholder image.
    Fallback,
}

/// Tick-rate and idle-threshold policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distributor {
    frames_per_second: u32,
    idle_threshold: u32,
}

impl Default for Distributor {
    fn default() -> Self {
        Self::new(DEFAULT_FRAMES_PER_SECOND, DEFAULT_IDLE_THRESHOLD)
    }
}

impl Distributor {
    /// Creates a distributor ticking `frames_per_second` times per second.
    ///
    /// A rate of zero is treated as one tick per second.
    pub fn new(frames_per_second: u32, idle_threshold: u32) -> Self {
        Self {
            frames_per_second: frames_per_second.max(1),
            idle_threshold,
        }
    }

    /// Ticks without a commit before the fallback is served.
    pub fn idle_threshold(&self) -> u32 {
        self.idle_threshold
    }

    /// Time between two ticks.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(1) / self.frames_per_second
    }

    /// Performs one tick: ages the idle counter and picks the buffer to send.
    pub fn tick(&self, store: &mut BufferStore) -> FrameSource {
        store.record_idle_tick(self.idle_threshold);
        if store.idle_ticks() >= self.idle_threshold {
            FrameSource::Fallback
        } else {
            FrameSource::Live(store.active_slot())
        }
    }
}
