//! Tick and timeout types

use core::fmt;

/// Absolute monotonic millisecond tick.
///
/// The counter is 32 bits wide and wraps after roughly 49.7 days. All
/// comparisons go through wrapping subtraction so deadlines remain correct
/// across the wrap as long as they lie within half the counter range of
/// "now".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Tick(pub u32);

impl Tick {
    /// Zero tick
    pub const ZERO: Self = Self(0);

    /// Create a tick from a raw millisecond count
    pub const fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    /// Raw millisecond count
    pub const fn millis(self) -> u32 {
        self.0
    }

    /// Tick `millis` milliseconds later, wrapping
    pub const fn wrapping_add(self, millis: u32) -> Self {
        Self(self.0.wrapping_add(millis))
    }

    /// Signed distance from `earlier` to `self`.
    ///
    /// Negative when `self` lies before `earlier`.
    pub const fn signed_diff(self, earlier: Tick) -> i32 {
        self.0.wrapping_sub(earlier.0) as i32
    }

    /// Milliseconds elapsed since `start`
    pub const fn elapsed_since(self, start: Tick) -> u32 {
        self.0.wrapping_sub(start.0)
    }

    /// True once `self` (a deadline) is at or before `now`
    pub const fn has_passed(self, now: Tick) -> bool {
        self.signed_diff(now) <= 0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick:{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Tick {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "tick:{}", self.0);
    }
}

/// Bounded or unbounded wait.
///
/// Used both for how long the dispatcher may block and for timer intervals;
/// registering a timer with [`Timeout::Forever`] removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Wait at most this many milliseconds
    Millis(u32),
    /// Wait without bound
    Forever,
}

impl Timeout {
    /// Do not block at all
    pub const NO_WAIT: Self = Self::Millis(0);

    pub const fn from_millis(millis: u32) -> Self {
        Self::Millis(millis)
    }

    pub const fn from_secs(secs: u32) -> Self {
        Self::Millis(secs.saturating_mul(1000))
    }

    /// Finite length in milliseconds, `None` for [`Timeout::Forever`]
    pub const fn as_millis(self) -> Option<u32> {
        match self {
            Self::Millis(ms) => Some(ms),
            Self::Forever => None,
        }
    }

    pub const fn is_forever(self) -> bool {
        matches!(self, Self::Forever)
    }

    pub const fn is_no_wait(self) -> bool {
        matches!(self, Self::Millis(0))
    }

    /// The shorter of two waits
    pub const fn min(self, other: Self) -> Self {
        match (self, other) {
            (Self::Forever, other) => other,
            (this, Self::Forever) => this,
            (Self::Millis(a), Self::Millis(b)) => {
                if a <= b {
                    Self::Millis(a)
                } else {
                    Self::Millis(b)
                }
            }
        }
    }

    /// Budget left after `elapsed` milliseconds, saturating at zero
    pub const fn remaining_after(self, elapsed: u32) -> Self {
        match self {
            Self::Millis(ms) => Self::Millis(ms.saturating_sub(elapsed)),
            Self::Forever => Self::Forever,
        }
    }
}

impl From<u32> for Timeout {
    #[inline]
    fn from(millis: u32) -> Self {
        Self::Millis(millis)
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Millis(ms) => write!(f, "{}ms", ms),
            Self::Forever => write!(f, "forever"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Timeout {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Millis(ms) => defmt::write!(fmt, "{}ms", ms),
            Self::Forever => defmt::write!(fmt, "forever"),
        }
    }
}

/// Macro to create timeouts
///
/// ```
/// use evl_core::{timeout, Timeout};
///
/// assert_eq!(timeout!(250 ms), Timeout::Millis(250));
/// assert_eq!(timeout!(2 s), Timeout::Millis(2000));
/// assert_eq!(timeout!(forever), Timeout::Forever);
/// ```
#[macro_export]
macro_rules! timeout {
    ($value:literal ms) => {
        $crate::Timeout::from_millis($value)
    };
    ($value:literal s) => {
        $crate::Timeout::from_secs($value)
    };
    (forever) => {
        $crate::Timeout::Forever
    };
}
