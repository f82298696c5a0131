//! Event registry
//!
//! Event descriptors bind a bitmask to a callback. A descriptor can be linked
//! but disabled, in which case matching bits stay pending until it is enabled
//! again or another descriptor consumes them.

use heapless::Vec;

use evl_core::{EventMask, EvlError, EvlResult};

use crate::{Callback, EVENT_SLOTS};

/// Handle to an event descriptor owned by a [`Scheduler`](crate::Scheduler).
///
/// Like [`TimerId`](crate::TimerId), only meaningful to the scheduler that
/// created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub(crate) u8);

impl EventId {
    /// Arena index of this descriptor
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for EventId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "event#{}", self.0);
    }
}

struct EventSlot<'a> {
    callback: Option<&'a dyn Callback<'a>>,
    mask: EventMask,
    enabled: bool,
    arg: usize,
}

impl EventSlot<'_> {
    const fn empty() -> Self {
        Self {
            callback: None,
            mask: EventMask::NONE,
            enabled: false,
            arg: 0,
        }
    }
}

/// An event whose bits were claimed from the pending set.
pub(crate) struct ClaimedEvent<'a> {
    pub callback: &'a dyn Callback<'a>,
    pub arg: usize,
    pub bits: EventMask,
}

/// Dispatch order captured at the start of a pass.
pub(crate) type DispatchOrder = Vec<EventId, EVENT_SLOTS>;

pub(crate) struct EventRegistry<'a> {
    slots: Vec<EventSlot<'a>, EVENT_SLOTS>,
    active: Vec<EventId, EVENT_SLOTS>,
}

impl<'a> EventRegistry<'a> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            active: Vec::new(),
        }
    }

    pub fn allocate(&mut self) -> EvlResult<EventId> {
        let id = EventId(self.slots.len() as u8);
        self.slots
            .push(EventSlot::empty())
            .map_err(|_| EvlError::RegistryFull)?;
        Ok(id)
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.active.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Bind `callback` to `mask`, enable the descriptor and link it if it is
    /// not linked yet.
    pub fn register(
        &mut self,
        id: EventId,
        callback: &'a dyn Callback<'a>,
        mask: EventMask,
        arg: usize,
    ) -> EvlResult<()> {
        let slot = self.slots.get_mut(id.index()).ok_or(EvlError::InvalidHandle)?;
        slot.callback = Some(callback);
        slot.mask = mask;
        slot.enabled = true;
        slot.arg = arg;

        if self.contains(id) {
            return Ok(());
        }
        self.active.push(id).map_err(|_| EvlError::RegistryFull)
    }

    pub fn deregister(&mut self, id: EventId) -> EvlResult<()> {
        if id.index() >= self.slots.len() {
            return Err(EvlError::InvalidHandle);
        }
        if !self.contains(id) {
            return Err(EvlError::NotFound);
        }
        self.active.retain(|linked| *linked != id);
        Ok(())
    }

    pub fn set_enabled(&mut self, id: EventId, enabled: bool) -> EvlResult<()> {
        let slot = self.slots.get_mut(id.index()).ok_or(EvlError::InvalidHandle)?;
        slot.enabled = enabled;
        Ok(())
    }

    pub fn is_enabled(&self, id: EventId) -> bool {
        self.contains(id) && self.slots[id.index()].enabled
    }

    pub fn mask(&self, id: EventId) -> Option<EventMask> {
        self.contains(id).then(|| self.slots[id.index()].mask)
    }

    /// Linked descriptors in dispatch order, most recently registered first.
    pub fn dispatch_order(&self) -> DispatchOrder {
        self.active.iter().rev().copied().collect()
    }

    /// If `id` is still linked, enabled and interested in `pending`, return
    /// its callback together with the bits it consumes.
    pub fn claim(&self, id: EventId, pending: EventMask) -> Option<ClaimedEvent<'a>> {
        if !self.contains(id) {
            return None;
        }
        let slot = &self.slots[id.index()];
        let bits = slot.mask & pending;
        if !slot.enabled || bits.is_empty() {
            return None;
        }
        Some(ClaimedEvent {
            callback: slot.callback?,
            arg: slot.arg,
            bits,
        })
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }
}
