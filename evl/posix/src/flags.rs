//! Thread-safe event flags for POSIX hosts

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use evl_core::{EventFlags, EventMask, EvlResult, Timeout};

/// Flag word shared between producer threads and the scheduler thread.
///
/// `post` may be called from any thread; a waiter blocked in `wait` wakes as
/// soon as one of its bits is set. Returned bits are cleared from the word.
#[derive(Debug, Default)]
pub struct StdEventFlags {
    bits: Mutex<u32>,
    ready: Condvar,
}

impl StdEventFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the flag word
    pub fn peek(&self) -> EventMask {
        EventMask(*self.bits.lock())
    }
}

impl EventFlags for StdEventFlags {
    fn post(&self, bits: EventMask) -> EvlResult<()> {
        let mut word = self.bits.lock();
        *word |= bits.bits();
        self.ready.notify_all();
        Ok(())
    }

    fn wait(&self, mask: EventMask, timeout: Timeout) -> EvlResult<EventMask> {
        let deadline = timeout
            .as_millis()
            .map(|ms| Instant::now() + Duration::from_millis(u64::from(ms)));
        let mut word = self.bits.lock();

        loop {
            let hit = *word & mask.bits();
            if hit != 0 {
                *word &= !hit;
                return Ok(EventMask(hit));
            }
            match deadline {
                None => self.ready.wait(&mut word),
                Some(deadline) => {
                    if self.ready.wait_until(&mut word, deadline).timed_out() {
                        let hit = *word & mask.bits();
                        *word &= !hit;
                        return Ok(EventMask(hit));
                    }
                }
            }
        }
    }

    fn clear(&self, bits: EventMask) {
        *self.bits.lock() &= !bits.bits();
    }
}
