//! Simulated time for deterministic tests.
//!
//! [`VirtualFlags`] never sleeps. A blocking wait jumps the shared
//! [`VirtualClock`] forward to whichever comes first: the end of the wait or
//! the next scheduled post. That lets a test drive seconds of timer activity
//! instantly and with exact tick values.

use std::cell::{Cell, RefCell};

use evl_core::{Clock, EventFlags, EventMask, EvlError, EvlResult, Tick, Timeout};

/// Manually driven millisecond clock.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Cell<u32>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(start: Tick) -> Self {
        Self {
            now: Cell::new(start.millis()),
        }
    }

    /// Move time forward by `millis`, wrapping.
    pub fn advance(&self, millis: u32) {
        self.now.set(self.now.get().wrapping_add(millis));
    }

    pub fn set(&self, tick: Tick) {
        self.now.set(tick.millis());
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Tick {
        Tick(self.now.get())
    }
}

/// Flag primitive living on a [`VirtualClock`].
///
/// Single-threaded by construction; "posts from another context" are
/// modelled with [`post_at`](Self::post_at).
#[derive(Debug)]
pub struct VirtualFlags<'c> {
    clock: &'c VirtualClock,
    bits: Cell<u32>,
    scheduled: RefCell<Vec<(Tick, EventMask)>>,
    failures: Cell<u32>,
    blocking_waits: Cell<u32>,
    slept: Cell<u64>,
}

impl<'c> VirtualFlags<'c> {
    pub fn new(clock: &'c VirtualClock) -> Self {
        Self {
            clock,
            bits: Cell::new(0),
            scheduled: RefCell::new(Vec::new()),
            failures: Cell::new(0),
            blocking_waits: Cell::new(0),
            slept: Cell::new(0),
        }
    }

    /// Post `bits` once the clock reaches `at`.
    pub fn post_at(&self, at: Tick, bits: EventMask) {
        self.scheduled.borrow_mut().push((at, bits));
    }

    /// Post `bits` `millis` from now.
    pub fn post_after(&self, millis: u32, bits: EventMask) {
        self.post_at(self.clock.now().wrapping_add(millis), bits);
    }

    /// Make the next `count` waits fail with [`EvlError::Primitive`].
    pub fn fail_next_waits(&self, count: u32) {
        self.failures.set(count);
    }

    /// Snapshot of the flag word
    pub fn peek(&self) -> EventMask {
        EventMask(self.bits.get())
    }

    /// Number of waits that were allowed to block
    pub fn blocking_waits(&self) -> u32 {
        self.blocking_waits.get()
    }

    /// Total virtual milliseconds spent inside waits
    pub fn slept_millis(&self) -> u64 {
        self.slept.get()
    }

    fn deliver_due(&self) {
        let now = self.clock.now();
        let mut scheduled = self.scheduled.borrow_mut();
        let mut word = self.bits.get();
        scheduled.retain(|(at, bits)| {
            if at.has_passed(now) {
                word |= bits.bits();
                false
            } else {
                true
            }
        });
        self.bits.set(word);
    }

    fn next_delivery(&self, now: Tick) -> Option<u32> {
        self.scheduled
            .borrow()
            .iter()
            .map(|(at, _)| at.signed_diff(now).max(0) as u32)
            .min()
    }

    fn take(&self, mask: EventMask) -> EventMask {
        let word = self.bits.get();
        self.bits.set(word & !mask.bits());
        EventMask(word & mask.bits())
    }
}

impl EventFlags for VirtualFlags<'_> {
    fn post(&self, bits: EventMask) -> EvlResult<()> {
        self.bits.set(self.bits.get() | bits.bits());
        Ok(())
    }

    fn wait(&self, mask: EventMask, timeout: Timeout) -> EvlResult<EventMask> {
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(EvlError::Primitive);
        }

        self.deliver_due();
        let hit = self.take(mask);
        if !hit.is_empty() || timeout.is_no_wait() {
            return Ok(hit);
        }

        let now = self.clock.now();
        let sleep = match (timeout.as_millis(), self.next_delivery(now)) {
            (Some(limit), Some(next)) => limit.min(next),
            (Some(limit), None) => limit,
            (None, Some(next)) => next,
            // nothing could ever wake this waiter
            (None, None) => return Err(EvlError::Primitive),
        };

        self.blocking_waits.set(self.blocking_waits.get() + 1);
        self.slept.set(self.slept.get() + u64::from(sleep));
        self.clock.advance(sleep);
        self.deliver_due();
        Ok(self.take(mask))
    }

    fn clear(&self, bits: EventMask) {
        let _ = self.take(bits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_advances_clock_to_timeout() {
        let clock = VirtualClock::new();
        let flags = VirtualFlags::new(&clock);

        assert_eq!(flags.wait(EventMask::ALL, Timeout::Millis(40)), Ok(EventMask::NONE));
        assert_eq!(clock.now(), Tick(40));
        assert_eq!(flags.blocking_waits(), 1);
    }

    #[test]
    fn test_scheduled_post_cuts_wait_short() {
        let clock = VirtualClock::new();
        let flags = VirtualFlags::new(&clock);
        flags.post_at(Tick(15), EventMask::bit(1));

        assert_eq!(flags.wait(EventMask::ALL, Timeout::Millis(100)), Ok(EventMask::bit(1)));
        assert_eq!(clock.now(), Tick(15));
    }

    #[test]
    fn test_forever_without_producer_fails() {
        let clock = VirtualClock::new();
        let flags = VirtualFlags::new(&clock);

        assert_eq!(flags.wait(EventMask::ALL, Timeout::Forever), Err(EvlError::Primitive));
    }

    #[test]
    fn test_injected_failures() {
        let clock = VirtualClock::new();
        let flags = VirtualFlags::new(&clock);
        flags.post(EventMask::bit(0)).unwrap();
        flags.fail_next_waits(1);

        assert_eq!(flags.wait(EventMask::ALL, Timeout::NO_WAIT), Err(EvlError::Primitive));
        assert_eq!(flags.wait(EventMask::ALL, Timeout::NO_WAIT), Ok(EventMask::bit(0)));
    }

    #[test]
    fn test_no_wait_does_not_advance() {
        let clock = VirtualClock::starting_at(Tick(7));
        let flags = VirtualFlags::new(&clock);

        assert_eq!(flags.wait(EventMask::ALL, Timeout::NO_WAIT), Ok(EventMask::NONE));
        assert_eq!(clock.now(), Tick(7));
        assert_eq!(flags.blocking_waits(), 0);
    }
}
