//! Event bitmask type

use core::fmt;
use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// A set of event bits.
///
/// Each bit stands for one kind of asynchronous occurrence (network change,
/// protocol acknowledgement, button edge, worker completion, ...). Masks are
/// plain 32-bit words so they can be posted from interrupt context.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventMask(pub u32);

impl EventMask {
    /// No bits
    pub const NONE: Self = Self(0);

    /// Every bit; the dispatcher waits on this
    pub const ALL: Self = Self(u32::MAX);

    /// Create a mask from a raw word
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Mask with only bit `n` set
    ///
    /// # Panics
    ///
    /// Panics if `n >= 32`.
    pub const fn bit(n: u8) -> Self {
        assert!(n < 32, "event bit out of range");
        Self(1 << n)
    }

    /// Raw word
    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if any bit is shared with `other`
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// True if every bit of `other` is also set here
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Bits set here but not in `other`
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Number of bits set
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }
}

impl From<u32> for EventMask {
    #[inline]
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl From<EventMask> for u32 {
    #[inline]
    fn from(mask: EventMask) -> Self {
        mask.0
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl BitAndAssign for EventMask {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for EventMask {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Debug for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventMask({:#010x})", self.0)
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for EventMask {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=u32:#x}", self.0);
    }
}
