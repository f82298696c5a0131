//! The dispatch loop
//!
//! One iteration of [`Scheduler::run`]:
//!
//! 1. if bits are already pending, poll instead of blocking;
//! 2. otherwise sleep until the earliest timer deadline, capped by what is
//!    left of the run's own budget;
//! 3. wait on the flag primitive and merge new bits into the pending set;
//! 4. dispatch pending bits to enabled event descriptors;
//! 5. return if a break was requested (timers of this iteration do not run);
//! 6. fire due timers;
//! 7. return a timeout once the run's budget is spent.
//!
//! All state is behind `Cell`/`RefCell` so callbacks, which receive
//! `&Scheduler`, can mutate the registries and re-enter `run`. No registry
//! borrow is ever held while a callback executes.

use core::cell::{Cell, RefCell};

use log::{debug, trace, warn};

use evl_core::{Clock, EventFlags, EventMask, EvlError, EvlResult, Tick, Timeout};

use crate::event::{EventId, EventRegistry};
use crate::timer::{TimerId, TimerRegistry};
use crate::{Callback, SchedulerConfig, MAX_INTERVAL_MS};

/// Cooperative event and timer dispatcher.
///
/// A scheduler borrows its flag primitive and clock for `'a`, as well as every
/// callback registered with it. It is deliberately `!Sync`: registration,
/// deregistration and [`run`](Self::run) belong to one thread. Other threads
/// and interrupt handlers talk to it only by posting bits into the shared
/// [`EventFlags`].
pub struct Scheduler<'a> {
    config: SchedulerConfig,
    flags: &'a dyn EventFlags,
    clock: &'a dyn Clock,
    timers: RefCell<TimerRegistry<'a>>,
    events: RefCell<EventRegistry<'a>>,
    /// Sticky set of posted but not yet dispatched bits
    pending: Cell<EventMask>,
    /// One-shot break request honoured by the innermost running loop
    stop_requested: Cell<bool>,
    /// Bits that end the current synchronous request
    interruptable: Cell<EventMask>,
    /// Interruptable bits observed since the request started
    interrupted_by: Cell<EventMask>,
    depth: Cell<u8>,
}

impl<'a> Scheduler<'a> {
    /// Create a scheduler with the default configuration
    pub fn new(flags: &'a dyn EventFlags, clock: &'a dyn Clock) -> Self {
        Self::with_config(flags, clock, SchedulerConfig::default())
    }

    /// Create a scheduler with an explicit configuration
    pub fn with_config(
        flags: &'a dyn EventFlags,
        clock: &'a dyn Clock,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            config,
            flags,
            clock,
            timers: RefCell::new(TimerRegistry::new()),
            events: RefCell::new(EventRegistry::new()),
            pending: Cell::new(EventMask::NONE),
            stop_requested: Cell::new(false),
            interruptable: Cell::new(EventMask::NONE),
            interrupted_by: Cell::new(EventMask::NONE),
            depth: Cell::new(0),
        }
    }

    /// Returns the scheduler configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Current tick of the scheduler's clock
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// Unlink every descriptor and forget all pending state.
    ///
    /// Descriptor handles stay valid and can be registered again.
    pub fn reset(&self) {
        self.timers.borrow_mut().clear();
        self.events.borrow_mut().clear();
        self.pending.set(EventMask::NONE);
        self.stop_requested.set(false);
        self.interruptable.set(EventMask::NONE);
        self.interrupted_by.set(EventMask::NONE);
        self.flags.clear(EventMask::ALL);
        debug!("{}: reset", self.config.name);
    }

    // ---------------------------------------------------------------- timers

    /// Allocate a timer descriptor.
    pub fn create_timer(&self) -> EvlResult<TimerId> {
        self.timers.borrow_mut().allocate()
    }

    /// Arm `id` to call `callback` every `interval`, first at `now + interval`.
    ///
    /// [`Timeout::Forever`] deregisters the timer instead, and an interval above
    /// [`MAX_INTERVAL_MS`] is [`EvlError::InvalidInterval`]. Registering a timer
    /// that is already armed changes nothing, not even its interval; use
    /// [`reschedule_timer`](Self::reschedule_timer) for that.
    pub fn register_timer(
        &self,
        id: TimerId,
        callback: &'a dyn Callback<'a>,
        interval: Timeout,
        arg: usize,
    ) -> EvlResult<()> {
        let now = self.clock.now();
        self.timers
            .borrow_mut()
            .register(id, callback, interval, arg, now)?;
        if !interval.is_forever() {
            trace!("{}: timer {} armed ({})", self.config.name, id.index(), interval);
        }
        Ok(())
    }

    /// Disarm `id`; [`EvlError::NotFound`] if it was not armed.
    pub fn deregister_timer(&self, id: TimerId) -> EvlResult<()> {
        self.timers.borrow_mut().deregister(id)?;
        trace!("{}: timer {} disarmed", self.config.name, id.index());
        Ok(())
    }

    /// Disarm `id` if armed, then arm it again with a fresh deadline.
    ///
    /// An out-of-range interval is refused before anything changes, so the
    /// timer keeps its current schedule.
    pub fn reschedule_timer(
        &self,
        id: TimerId,
        callback: &'a dyn Callback<'a>,
        interval: Timeout,
        arg: usize,
    ) -> EvlResult<()> {
        if matches!(interval, Timeout::Millis(ms) if ms > MAX_INTERVAL_MS) {
            return Err(EvlError::InvalidInterval);
        }
        match self.deregister_timer(id) {
            Ok(()) | Err(EvlError::NotFound) => {}
            Err(err) => return Err(err),
        }
        match self.register_timer(id, callback, interval, arg) {
            Err(EvlError::NotFound) if interval.is_forever() => Ok(()),
            result => result,
        }
    }

    /// Callback of `id` if it is armed.
    pub fn query_timer(&self, id: TimerId) -> Option<&'a dyn Callback<'a>> {
        self.timers.borrow().callback(id)
    }

    pub fn is_timer_armed(&self, id: TimerId) -> bool {
        self.timers.borrow().contains(id)
    }

    /// Interval of `id` in milliseconds if it is armed.
    pub fn timer_interval(&self, id: TimerId) -> Option<u32> {
        self.timers.borrow().interval(id)
    }

    /// Absolute deadline of `id` if it is armed.
    pub fn timer_deadline(&self, id: TimerId) -> Option<Tick> {
        self.timers.borrow().deadline(id)
    }

    /// Number of armed timers
    pub fn timer_count(&self) -> usize {
        self.timers.borrow().len()
    }

    // ---------------------------------------------------------------- events

    /// Allocate an event descriptor.
    pub fn create_event(&self) -> EvlResult<EventId> {
        self.events.borrow_mut().allocate()
    }

    /// Bind `callback` to the bits of `mask` and enable it.
    pub fn register_event(
        &self,
        id: EventId,
        callback: &'a dyn Callback<'a>,
        mask: EventMask,
        arg: usize,
    ) -> EvlResult<()> {
        self.events.borrow_mut().register(id, callback, mask, arg)?;
        trace!("{}: event {} bound to {}", self.config.name, id.index(), mask);
        Ok(())
    }

    /// Unlink `id`; [`EvlError::NotFound`] if it was not registered.
    pub fn deregister_event(&self, id: EventId) -> EvlResult<()> {
        self.events.borrow_mut().deregister(id)?;
        trace!("{}: event {} unbound", self.config.name, id.index());
        Ok(())
    }

    /// Make `id` eligible for dispatch again.
    pub fn enable_event(&self, id: EventId) -> EvlResult<()> {
        self.events.borrow_mut().set_enabled(id, true)
    }

    /// Keep `id` registered but stop dispatching to it. Its bits stay pending.
    pub fn disable_event(&self, id: EventId) -> EvlResult<()> {
        self.events.borrow_mut().set_enabled(id, false)
    }

    pub fn is_event_enabled(&self, id: EventId) -> bool {
        self.events.borrow().is_enabled(id)
    }

    pub fn is_event_registered(&self, id: EventId) -> bool {
        self.events.borrow().contains(id)
    }

    /// Bits `id` is bound to if it is registered.
    pub fn event_mask(&self, id: EventId) -> Option<EventMask> {
        self.events.borrow().mask(id)
    }

    /// Number of registered event descriptors
    pub fn event_count(&self) -> usize {
        self.events.borrow().len()
    }

    // ----------------------------------------------------------- signalling

    /// Post bits into the flag primitive.
    ///
    /// The bits are picked up by the next wait of the innermost running loop,
    /// never by a dispatch pass already in progress.
    pub fn post(&self, bits: EventMask) -> EvlResult<()> {
        self.flags.post(bits)
    }

    /// Bits collected from the primitive but not yet consumed
    pub fn pending(&self) -> EventMask {
        self.pending.get()
    }

    /// Ask the innermost running loop to return at its next check.
    pub fn break_loop(&self) {
        self.stop_requested.set(true);
    }

    pub fn is_break_requested(&self) -> bool {
        self.stop_requested.get()
    }

    /// Number of `run` invocations currently on the stack
    pub fn depth(&self) -> u8 {
        self.depth.get()
    }

    /// Bits that end the current synchronous request
    pub fn interruptable(&self) -> EventMask {
        self.interruptable.get()
    }

    /// Replace the interruptable mask, returning the previous one.
    ///
    /// Prefer [`run_until`](Self::run_until), which installs and restores the
    /// mask around a nested loop.
    pub fn set_interruptable(&self, mask: EventMask) -> EventMask {
        self.interruptable.replace(mask)
    }

    /// Called by event callbacks: if any of `bits` is awaited by the current
    /// synchronous request, record it and break the innermost loop.
    pub fn interrupt_if_awaited(&self, bits: EventMask) -> bool {
        let hit = bits & self.interruptable.get();
        if hit.is_empty() {
            return false;
        }
        self.interrupted_by.set(self.interrupted_by.get() | hit);
        self.break_loop();
        true
    }

    // ------------------------------------------------------------ the loop

    /// Dispatch events and timers until a break is requested or `timeout`
    /// elapses.
    ///
    /// Returns `Ok(())` when stopped by [`break_loop`](Self::break_loop) and
    /// [`EvlError::Timeout`] when a finite budget runs out. With
    /// [`Timeout::Forever`] and no break the call never returns. A budget of
    /// zero performs exactly one non-blocking iteration.
    pub fn run(&self, timeout: Timeout) -> EvlResult<()> {
        let _depth = DepthGuard::enter(&self.depth);
        let start = self.clock.now();
        debug!(
            "{}: run enter (depth {}, budget {})",
            self.config.name,
            self.depth.get(),
            timeout
        );

        loop {
            let wait = self.next_wait(start, timeout);
            self.collect(wait);

            if !self.pending.get().is_empty() {
                self.dispatch_events();
            }

            if self.stop_requested.replace(false) {
                debug!("{}: run stopped (depth {})", self.config.name, self.depth.get());
                return Ok(());
            }

            self.fire_due_timers();

            if let Timeout::Millis(budget) = timeout {
                if self.clock.now().elapsed_since(start) >= budget {
                    self.stop_requested.set(false);
                    debug!("{}: run timed out (depth {})", self.config.name, self.depth.get());
                    return Err(EvlError::Timeout);
                }
            }
        }
    }

    /// Run a nested loop until one of `awaited` is observed.
    ///
    /// Installs `awaited` as the interruptable mask for the duration of the
    /// call. Event callbacks report their bits through
    /// [`interrupt_if_awaited`](Self::interrupt_if_awaited); the first hit
    /// breaks the loop. Returns the awaited bits that were seen, which is
    /// empty if something else broke the loop, or [`EvlError::Timeout`].
    ///
    /// Only one request may be outstanding per scheduler; callers must
    /// serialize synchronous requests.
    pub fn run_until(&self, awaited: EventMask, timeout: Timeout) -> EvlResult<EventMask> {
        let outer_mask = self.interruptable.replace(awaited);
        if !outer_mask.is_empty() {
            warn!(
                "{}: synchronous request for {} overlaps one for {}",
                self.config.name, awaited, outer_mask
            );
        }
        let outer_hits = self.interrupted_by.replace(EventMask::NONE);

        let result = self.run(timeout);

        let hits = self.interrupted_by.replace(outer_hits);
        self.interruptable.set(outer_mask);
        result.map(|()| hits)
    }

    fn next_wait(&self, start: Tick, timeout: Timeout) -> Timeout {
        if !self.pending.get().is_empty() {
            return Timeout::NO_WAIT;
        }
        let now = self.clock.now();
        let timer_wait = self.timers.borrow().earliest_wait(now);
        timer_wait.min(timeout.remaining_after(now.elapsed_since(start)))
    }

    /// Wait on the primitive and fold whatever arrived into the pending set.
    /// A failed wait counts as "nothing arrived".
    fn collect(&self, wait: Timeout) {
        let result = if wait.is_no_wait() {
            match self.flags.poll(EventMask::ALL) {
                Ok(bits) => Ok(bits),
                Err(nb::Error::WouldBlock) => Ok(EventMask::NONE),
                Err(nb::Error::Other(err)) => Err(err),
            }
        } else {
            if let Some(idle) = self.config.idle_callback {
                idle();
            }
            self.flags.wait(EventMask::ALL, wait)
        };

        match result {
            Ok(bits) if !bits.is_empty() => {
                trace!("{}: collected {}", self.config.name, bits);
                self.pending.set(self.pending.get() | bits);
            }
            Ok(_) => {}
            Err(err) => warn!("{}: event flag wait failed: {}", self.config.name, err),
        }
    }

    /// One pass over the event registry.
    ///
    /// The pass walks the registry as it was when the pass began; descriptors
    /// linked by a callback wait for the next iteration. Bits are removed from
    /// the pending set before the callback runs, so a callback that posts its
    /// own bit is called again on a later iteration, not in this pass.
    fn dispatch_events(&self) {
        let order = self.events.borrow().dispatch_order();
        for id in order {
            let pending = self.pending.get();
            if pending.is_empty() {
                break;
            }
            let claimed = self.events.borrow().claim(id, pending);
            if let Some(event) = claimed {
                self.pending.set(pending.difference(event.bits));
                trace!(
                    "{}: event {} consumes {}",
                    self.config.name,
                    id.index(),
                    event.bits
                );
                event.callback.call(self, event.arg);
            }
        }
    }

    /// Fire every due timer, rescanning from the front after each one.
    fn fire_due_timers(&self) {
        let now = self.clock.now();
        let mut fired = 0;
        loop {
            let due = self.timers.borrow_mut().take_due(now);
            let Some(due) = due else {
                break;
            };
            trace!("{}: timer {} fires at {}", self.config.name, due.id.index(), now);
            due.callback.call(self, due.arg);

            fired += 1;
            if fired >= self.config.max_timer_fires {
                warn!(
                    "{}: {} timer firings in one pass, deferring the rest",
                    self.config.name, fired
                );
                break;
            }
        }
    }
}

/// Tracks `run` nesting for the lifetime of one call.
struct DepthGuard<'s>(&'s Cell<u8>);

impl<'s> DepthGuard<'s> {
    fn enter(depth: &'s Cell<u8>) -> Self {
        depth.set(depth.get().saturating_add(1));
        Self(depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}
