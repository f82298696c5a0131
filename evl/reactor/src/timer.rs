//! Timer registry
//!
//! Timer descriptors live in a fixed arena and are addressed by [`TimerId`].
//! A separate active list records which descriptors are currently linked and
//! in which order; the most recently registered timer comes first.

use heapless::Vec;

use evl_core::{EvlError, EvlResult, Tick, Timeout};

use crate::{Callback, MAX_INTERVAL_MS, TIMER_SLOTS};

/// Handle to a timer descriptor owned by a [`Scheduler`](crate::Scheduler).
///
/// A handle is a bare arena index and only means something to the scheduler
/// that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) u8);

impl TimerId {
    /// Arena index of this descriptor
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TimerId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "timer#{}", self.0);
    }
}

struct TimerSlot<'a> {
    callback: Option<&'a dyn Callback<'a>>,
    interval: u32,
    deadline: Tick,
    arg: usize,
}

impl TimerSlot<'_> {
    const fn empty() -> Self {
        Self {
            callback: None,
            interval: 0,
            deadline: Tick::ZERO,
            arg: 0,
        }
    }
}

/// A timer that came due and has already been rescheduled.
pub(crate) struct DueTimer<'a> {
    pub id: TimerId,
    pub callback: &'a dyn Callback<'a>,
    pub arg: usize,
}

pub(crate) struct TimerRegistry<'a> {
    slots: Vec<TimerSlot<'a>, TIMER_SLOTS>,
    /// Linked descriptors in insertion order; scans walk it backwards.
    active: Vec<TimerId, TIMER_SLOTS>,
}

impl<'a> TimerRegistry<'a> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            active: Vec::new(),
        }
    }

    pub fn allocate(&mut self) -> EvlResult<TimerId> {
        let id = TimerId(self.slots.len() as u8);
        self.slots
            .push(TimerSlot::empty())
            .map_err(|_| EvlError::RegistryFull)?;
        Ok(id)
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.active.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Link `id` with a fresh deadline. A descriptor that is already linked
    /// is left untouched. Intervals above [`MAX_INTERVAL_MS`] are refused.
    pub fn register(
        &mut self,
        id: TimerId,
        callback: &'a dyn Callback<'a>,
        interval: Timeout,
        arg: usize,
        now: Tick,
    ) -> EvlResult<()> {
        let interval = match interval {
            Timeout::Millis(ms) if ms <= MAX_INTERVAL_MS => ms,
            Timeout::Millis(_) => return Err(EvlError::InvalidInterval),
            Timeout::Forever => return self.deregister(id),
        };
        if id.index() >= self.slots.len() {
            return Err(EvlError::InvalidHandle);
        }
        if self.contains(id) {
            return Ok(());
        }

        let slot = &mut self.slots[id.index()];
        slot.callback = Some(callback);
        slot.interval = interval;
        slot.deadline = now.wrapping_add(interval);
        slot.arg = arg;
        // capacity equals the arena size, so an unlinked id always fits
        self.active.push(id).map_err(|_| EvlError::RegistryFull)
    }

    pub fn deregister(&mut self, id: TimerId) -> EvlResult<()> {
        if id.index() >= self.slots.len() {
            return Err(EvlError::InvalidHandle);
        }
        if !self.contains(id) {
            return Err(EvlError::NotFound);
        }
        self.active.retain(|linked| *linked != id);
        Ok(())
    }

    pub fn callback(&self, id: TimerId) -> Option<&'a dyn Callback<'a>> {
        if self.contains(id) {
            self.slots[id.index()].callback
        } else {
            None
        }
    }

    pub fn interval(&self, id: TimerId) -> Option<u32> {
        self.contains(id).then(|| self.slots[id.index()].interval)
    }

    pub fn deadline(&self, id: TimerId) -> Option<Tick> {
        self.contains(id).then(|| self.slots[id.index()].deadline)
    }

    /// How long the loop may sleep before the next deadline.
    pub fn earliest_wait(&self, now: Tick) -> Timeout {
        let mut wait = Timeout::Forever;
        for id in self.active.iter() {
            let diff = self.slots[id.index()].deadline.signed_diff(now);
            if diff <= 0 {
                return Timeout::NO_WAIT;
            }
            wait = wait.min(Timeout::Millis(diff as u32));
        }
        wait
    }

    /// Find the first due timer in registry order and push its deadline one
    /// interval past `now`. The caller invokes it and then scans again from
    /// the front, since the callback may reshape the registry.
    pub fn take_due(&mut self, now: Tick) -> Option<DueTimer<'a>> {
        let id = self
            .active
            .iter()
            .rev()
            .copied()
            .find(|id| self.slots[id.index()].deadline.has_passed(now))?;

        let slot = &mut self.slots[id.index()];
        slot.deadline = now.wrapping_add(slot.interval);
        let callback = slot.callback?;
        Some(DueTimer {
            id,
            callback,
            arg: slot.arg,
        })
    }

    /// Unlink every descriptor; handles stay valid.
    pub fn clear(&mut self) {
        self.active.clear();
    }
}
