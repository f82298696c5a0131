//! Callback capability

use crate::Scheduler;

/// Work invoked by the dispatcher when a timer expires or an event matches.
///
/// Callbacks run to completion on the scheduler's thread. They receive the
/// scheduler itself so they can register or deregister descriptors, post
/// bits, request a break, or run a nested dispatch loop. `arg` is the value
/// supplied at registration, which lets one handler serve several
/// descriptors.
///
/// `'a` is the scheduler's borrow lifetime. The receiver is borrowed for `'a`
/// as well, so a callback can register itself, or anything else that lives
/// that long, with the scheduler it is called with.
pub trait Callback<'a> {
    fn call(&'a self, sched: &Scheduler<'a>, arg: usize);
}

impl<'a> Callback<'a> for fn(&Scheduler<'_>, usize) {
    fn call(&'a self, sched: &Scheduler<'a>, arg: usize) {
        self(sched, arg)
    }
}

/// Adapter that turns a closure into a [`Callback`].
pub struct FnCallback<F>(F);

impl<'a, F> Callback<'a> for FnCallback<F>
where
    F: Fn(&Scheduler<'a>, usize),
{
    fn call(&'a self, sched: &Scheduler<'a>, arg: usize) {
        (self.0)(sched, arg)
    }
}

/// Wrap a closure as a [`Callback`].
///
/// ```
/// use core::cell::Cell;
/// use evl_reactor::{from_fn, Callback};
///
/// let hits = Cell::new(0);
/// let on_tick = from_fn(|_, _| hits.set(hits.get() + 1));
/// let _: &dyn Callback<'_> = &on_tick;
/// ```
pub fn from_fn<'a, F>(f: F) -> FnCallback<F>
where
    F: Fn(&Scheduler<'a>, usize),
{
    FnCallback(f)
}
