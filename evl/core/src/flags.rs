//! Platform seams: monotonic clock and event-flag primitive
//!
//! The dispatcher never touches hardware or an OS directly. It reads time
//! through [`Clock`] and blocks on an [`EventFlags`] implementation. Ports
//! provide both; [`CsEventFlags`] is a bare-metal flag word guarded by a
//! critical section.

use core::cell::Cell;

use critical_section::Mutex;

use crate::{EventMask, EvlResult, Tick, Timeout};

/// Monotonic millisecond clock
pub trait Clock {
    /// Current tick. May wrap; consumers use wrapping arithmetic.
    fn now(&self) -> Tick;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Tick {
        (**self).now()
    }
}

/// Multi-bit signal that can be posted from any execution context.
///
/// `post` is the only operation the dispatcher expects to be called from
/// another thread or interrupt handler; implementations must make it safe to
/// do so.
pub trait EventFlags {
    /// OR `bits` into the flag word and wake a waiter.
    fn post(&self, bits: EventMask) -> EvlResult<()>;

    /// Block until any bit of `mask` is set or `timeout` elapses.
    ///
    /// Returns the bits that were set (and clears them from the flag word),
    /// or an empty mask if the wait timed out.
    fn wait(&self, mask: EventMask, timeout: Timeout) -> EvlResult<EventMask>;

    /// Clear `bits` without waiting.
    fn clear(&self, bits: EventMask);

    /// Take any set bits of `mask` without blocking.
    fn poll(&self, mask: EventMask) -> nb::Result<EventMask, crate::EvlError> {
        match self.wait(mask, Timeout::NO_WAIT) {
            Ok(bits) if !bits.is_empty() => Ok(bits),
            Ok(_) => Err(nb::Error::WouldBlock),
            Err(err) => Err(nb::Error::Other(err)),
        }
    }
}

impl<F: EventFlags + ?Sized> EventFlags for &F {
    fn post(&self, bits: EventMask) -> EvlResult<()> {
        (**self).post(bits)
    }

    fn wait(&self, mask: EventMask, timeout: Timeout) -> EvlResult<EventMask> {
        (**self).wait(mask, timeout)
    }

    fn clear(&self, bits: EventMask) {
        (**self).clear(bits)
    }

    fn poll(&self, mask: EventMask) -> nb::Result<EventMask, crate::EvlError> {
        (**self).poll(mask)
    }
}

/// Event flags for targets without an RTOS.
///
/// The flag word lives in a critical-section mutex so interrupt handlers can
/// post into it. Waiting spins on the word until a bit arrives or the clock
/// says the timeout has elapsed.
pub struct CsEventFlags<'c> {
    bits: Mutex<Cell<u32>>,
    clock: &'c (dyn Clock + Sync),
    idle: Option<fn()>,
}

impl<'c> CsEventFlags<'c> {
    /// Create an empty flag word timed by `clock`
    pub const fn new(clock: &'c (dyn Clock + Sync)) -> Self {
        Self {
            bits: Mutex::new(Cell::new(0)),
            clock,
            idle: None,
        }
    }

    /// Call `idle` on every spin of a blocking wait (e.g. wait-for-interrupt)
    pub const fn with_idle(mut self, idle: fn()) -> Self {
        self.idle = Some(idle);
        self
    }

    /// Snapshot of the flag word
    pub fn peek(&self) -> EventMask {
        critical_section::with(|cs| EventMask(self.bits.borrow(cs).get()))
    }

    fn take(&self, mask: EventMask) -> EventMask {
        critical_section::with(|cs| {
            let cell = self.bits.borrow(cs);
            let word = cell.get();
            cell.set(word & !mask.0);
            EventMask(word & mask.0)
        })
    }
}

impl EventFlags for CsEventFlags<'_> {
    fn post(&self, bits: EventMask) -> EvlResult<()> {
        critical_section::with(|cs| {
            let cell = self.bits.borrow(cs);
            cell.set(cell.get() | bits.0);
        });
        Ok(())
    }

    fn wait(&self, mask: EventMask, timeout: Timeout) -> EvlResult<EventMask> {
        let start = self.clock.now();
        loop {
            match self.poll(mask) {
                Ok(bits) => return Ok(bits),
                Err(nb::Error::Other(err)) => return Err(err),
                Err(nb::Error::WouldBlock) => {}
            }
            if let Timeout::Millis(ms) = timeout {
                if self.clock.now().elapsed_since(start) >= ms {
                    return Ok(EventMask::NONE);
                }
            }
            match self.idle {
                Some(idle) => idle(),
                None => core::hint::spin_loop(),
            }
        }
    }

    fn clear(&self, bits: EventMask) {
        let _ = self.take(bits);
    }

    fn poll(&self, mask: EventMask) -> nb::Result<EventMask, crate::EvlError> {
        let bits = self.take(mask);
        if bits.is_empty() {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(bits)
        }
    }
}
