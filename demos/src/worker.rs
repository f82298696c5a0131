//! Periodic job offloaded to a helper thread.
//!
//! The timer disarms itself and hands the job to a thread; the thread posts
//! the completion bit; the completion callback collects the result and arms
//! the timer again. The interval therefore counts from the end of one run to
//! the start of the next, and at most one job is ever in flight.

use std::cell::Cell;
use std::sync::Arc;
use std::thread;

use log::{debug, info, warn};
use parking_lot::Mutex;

use evl_posix::StdEventFlags;
use evl_reactor::{
    Callback, EventFlags, EventId, EventMask, EvlResult, Scheduler, TimerId, Timeout,
};

const ON_TIMER: usize = 0;
const ON_DONE: usize = 1;

pub struct Worker {
    name: &'static str,
    done_bit: EventMask,
    interval: Cell<Timeout>,
    job: fn() -> u32,
    poster: Arc<StdEventFlags>,
    output: Arc<Mutex<Option<u32>>>,
    handles: Cell<Option<(TimerId, EventId)>>,
    last: Cell<Option<u32>>,
    runs: Cell<u32>,
}

impl Worker {
    pub fn new(
        name: &'static str,
        done_bit: EventMask,
        interval: Timeout,
        job: fn() -> u32,
        poster: Arc<StdEventFlags>,
    ) -> Self {
        Self {
            name,
            done_bit,
            interval: Cell::new(interval),
            job,
            poster,
            output: Arc::new(Mutex::new(None)),
            handles: Cell::new(None),
            last: Cell::new(None),
            runs: Cell::new(0),
        }
    }

    /// Allocate descriptors on first use, bind the completion bit and arm the
    /// timer.
    pub fn start<'a>(&'a self, sched: &Scheduler<'a>) -> EvlResult<()> {
        let (timer, done) = match self.handles.get() {
            Some(handles) => handles,
            None => {
                let handles = (sched.create_timer()?, sched.create_event()?);
                self.handles.set(Some(handles));
                handles
            }
        };
        sched.register_event(done, self, self.done_bit, ON_DONE)?;
        sched.register_timer(timer, self, self.interval.get(), ON_TIMER)
    }

    /// Run the job now instead of waiting for the timer. Ignored while a job
    /// is in flight.
    pub fn trigger<'a>(&'a self, sched: &Scheduler<'a>) {
        if let Some((timer, _)) = self.handles.get() {
            if sched.is_timer_armed(timer) {
                self.dispatch(sched);
            }
        }
    }

    /// Change the interval; an armed timer restarts with the new one.
    pub fn change_interval<'a>(&'a self, sched: &Scheduler<'a>, interval: Timeout) -> EvlResult<()> {
        self.interval.set(interval);
        match self.handles.get() {
            Some((timer, _)) if sched.is_timer_armed(timer) => {
                sched.reschedule_timer(timer, self, interval, ON_TIMER)
            }
            _ => Ok(()),
        }
    }

    pub fn last(&self) -> Option<u32> {
        self.last.get()
    }

    pub fn runs(&self) -> u32 {
        self.runs.get()
    }

    fn dispatch<'a>(&'a self, sched: &Scheduler<'a>) {
        let Some((timer, _)) = self.handles.get() else {
            return;
        };
        let _ = sched.deregister_timer(timer);

        let job = self.job;
        let output = Arc::clone(&self.output);
        let poster = Arc::clone(&self.poster);
        let done_bit = self.done_bit;
        let spawned = thread::Builder::new()
            .name(self.name.to_string())
            .spawn(move || {
                *output.lock() = Some(job());
                if let Err(err) = poster.post(done_bit) {
                    warn!("completion post failed: {}", err);
                }
            });

        match spawned {
            Ok(_) => debug!("{}: job started", self.name),
            Err(err) => {
                warn!("{}: cannot start job: {}", self.name, err);
                self.rearm(sched, timer);
            }
        }
    }

    fn finish<'a>(&'a self, sched: &Scheduler<'a>) {
        let value = self.output.lock().take();
        self.last.set(value);
        self.runs.set(self.runs.get() + 1);
        match value {
            Some(value) => info!("{}: result {}", self.name, value),
            None => warn!("{}: completion without a result", self.name),
        }
        if let Some((timer, _)) = self.handles.get() {
            self.rearm(sched, timer);
        }
    }

    fn rearm<'a>(&'a self, sched: &Scheduler<'a>, timer: TimerId) {
        if let Err(err) = sched.register_timer(timer, self, self.interval.get(), ON_TIMER) {
            warn!("{}: cannot re-arm: {}", self.name, err);
        }
    }
}

impl<'a> Callback<'a> for Worker {
    fn call(&'a self, sched: &Scheduler<'a>, arg: usize) {
        match arg {
            ON_TIMER => self.dispatch(sched),
            _ => self.finish(sched),
        }
    }
}
