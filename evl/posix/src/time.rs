//! Monotonic millisecond clock for POSIX hosts

use std::time::Instant;

use evl_core::{Clock, Tick};

/// Millisecond tick source backed by [`Instant`].
///
/// The tick is truncated to 32 bits and wraps like a firmware tick counter
/// would. An offset can be applied to start close to the wrap point.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
    offset: u32,
}

impl MonotonicClock {
    /// Clock reading zero now
    pub fn new() -> Self {
        Self::starting_at(Tick::ZERO)
    }

    /// Clock reading `start` now
    pub fn starting_at(start: Tick) -> Self {
        Self {
            origin: Instant::now(),
            offset: start.millis(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Tick {
        let elapsed = self.origin.elapsed().as_millis() as u32;
        Tick(self.offset.wrapping_add(elapsed))
    }
}
