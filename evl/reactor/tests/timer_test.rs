//! Timer dispatch on a virtual clock

use core::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU32, Ordering};

use evl_posix::sim::{VirtualClock, VirtualFlags};
use evl_reactor::{
    from_fn, timeout, Callback, Clock, EvlError, Scheduler, SchedulerConfig, Tick, TimerId,
    Timeout, MAX_INTERVAL_MS,
};

#[test]
fn periodic_timers_fire_at_their_rate() {
    let fast = Cell::new(0u32);
    let slow = Cell::new(0u32);
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let on_fast = from_fn(|_, _| fast.set(fast.get() + 1));
    let on_slow = from_fn(|_, _| slow.set(slow.get() + 1));
    let sched = Scheduler::new(&flags, &clock);

    let t_fast = sched.create_timer().unwrap();
    let t_slow = sched.create_timer().unwrap();
    sched.register_timer(t_fast, &on_fast, timeout!(100 ms), 0).unwrap();
    sched.register_timer(t_slow, &on_slow, timeout!(250 ms), 0).unwrap();

    assert_eq!(sched.run(timeout!(1000 ms)), Err(EvlError::Timeout));
    assert_eq!(fast.get(), 10);
    assert_eq!(slow.get(), 4);
    assert_eq!(clock.now(), Tick(1000));
}

#[test]
fn timers_survive_tick_wraparound() {
    let hits = Cell::new(0u32);
    let clock = VirtualClock::starting_at(Tick(u32::MAX - 150));
    let flags = VirtualFlags::new(&clock);
    let on_tick = from_fn(|_, _| hits.set(hits.get() + 1));
    let sched = Scheduler::new(&flags, &clock);

    let timer = sched.create_timer().unwrap();
    sched.register_timer(timer, &on_tick, timeout!(100 ms), 0).unwrap();

    assert_eq!(sched.run(timeout!(1000 ms)), Err(EvlError::Timeout));
    assert_eq!(hits.get(), 10);
    assert_eq!(clock.now(), Tick(849));
}

#[test]
fn duplicate_registration_keeps_interval() {
    let first = Cell::new(0u32);
    let second = Cell::new(0u32);
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let on_first = from_fn(|_, _| first.set(first.get() + 1));
    let on_second = from_fn(|_, _| second.set(second.get() + 1));
    let sched = Scheduler::new(&flags, &clock);

    let timer = sched.create_timer().unwrap();
    sched.register_timer(timer, &on_first, timeout!(100 ms), 0).unwrap();
    sched.register_timer(timer, &on_second, timeout!(50 ms), 0).unwrap();

    assert_eq!(sched.timer_count(), 1);
    assert_eq!(sched.timer_interval(timer), Some(100));
    assert_eq!(sched.timer_deadline(timer), Some(Tick(100)));

    assert_eq!(sched.run(timeout!(100 ms)), Err(EvlError::Timeout));
    assert_eq!(first.get(), 1);
    assert_eq!(second.get(), 0);
}

#[test]
fn oversized_interval_is_rejected() {
    let hits = Cell::new(0u32);
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let on_tick = from_fn(|_, _| hits.set(hits.get() + 1));
    let sched = Scheduler::new(&flags, &clock);

    let timer = sched.create_timer().unwrap();
    assert_eq!(
        sched.register_timer(timer, &on_tick, Timeout::Millis(0x8000_0001), 0),
        Err(EvlError::InvalidInterval)
    );
    assert!(!sched.is_timer_armed(timer));

    assert_eq!(sched.run(timeout!(10 ms)), Err(EvlError::Timeout));
    assert_eq!(hits.get(), 0);
    assert_eq!(clock.now(), Tick(10));
}

#[test]
fn longest_interval_waits_instead_of_spinning() {
    let hits = Cell::new(0u32);
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let on_tick = from_fn(|_, _| hits.set(hits.get() + 1));
    let sched = Scheduler::new(&flags, &clock);

    let timer = sched.create_timer().unwrap();
    sched
        .register_timer(timer, &on_tick, Timeout::Millis(MAX_INTERVAL_MS), 0)
        .unwrap();

    assert_eq!(sched.run(timeout!(10 ms)), Err(EvlError::Timeout));
    assert_eq!(hits.get(), 0);
    assert_eq!(flags.blocking_waits(), 1);
    assert_eq!(clock.now(), Tick(10));
}

#[test]
fn invalid_reschedule_keeps_current_schedule() {
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let nop = from_fn(|_, _| {});
    let sched = Scheduler::new(&flags, &clock);

    let timer = sched.create_timer().unwrap();
    sched.register_timer(timer, &nop, timeout!(100 ms), 0).unwrap();
    assert_eq!(
        sched.reschedule_timer(timer, &nop, Timeout::Millis(u32::MAX), 0),
        Err(EvlError::InvalidInterval)
    );

    assert!(sched.is_timer_armed(timer));
    assert_eq!(sched.timer_interval(timer), Some(100));
    assert_eq!(sched.timer_deadline(timer), Some(Tick(100)));
}

#[test]
fn handle_beyond_another_arena_is_invalid() {
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let nop = from_fn(|_, _| {});
    let a = Scheduler::new(&flags, &clock);
    let b = Scheduler::new(&flags, &clock);

    a.create_timer().unwrap();
    let a_second = a.create_timer().unwrap();
    b.create_timer().unwrap();

    assert_eq!(
        b.register_timer(a_second, &nop, timeout!(10 ms), 0),
        Err(EvlError::InvalidHandle)
    );
    assert_eq!(b.deregister_timer(a_second), Err(EvlError::InvalidHandle));
    assert_eq!(b.timer_count(), 0);
}

#[test]
fn reschedule_replaces_interval() {
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let nop = from_fn(|_, _| {});
    let sched = Scheduler::new(&flags, &clock);

    let timer = sched.create_timer().unwrap();
    sched.register_timer(timer, &nop, timeout!(100 ms), 0).unwrap();
    clock.advance(30);
    sched.reschedule_timer(timer, &nop, timeout!(50 ms), 0).unwrap();

    assert_eq!(sched.timer_interval(timer), Some(50));
    assert_eq!(sched.timer_deadline(timer), Some(Tick(80)));

    sched.reschedule_timer(timer, &nop, Timeout::Forever, 0).unwrap();
    assert!(!sched.is_timer_armed(timer));
    // rescheduling a disarmed timer to "never" is not an error
    sched.reschedule_timer(timer, &nop, Timeout::Forever, 0).unwrap();
}

#[test]
fn forever_interval_disarms() {
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let nop = from_fn(|_, _| {});
    let sched = Scheduler::new(&flags, &clock);

    let timer = sched.create_timer().unwrap();
    sched.register_timer(timer, &nop, timeout!(10 ms), 0).unwrap();
    sched.register_timer(timer, &nop, Timeout::Forever, 0).unwrap();

    assert!(!sched.is_timer_armed(timer));
    assert!(sched.query_timer(timer).is_none());
}

#[test]
fn deregister_unknown_timer_is_not_found() {
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let nop = from_fn(|_, _| {});
    let sched = Scheduler::new(&flags, &clock);

    let timer = sched.create_timer().unwrap();
    assert_eq!(sched.deregister_timer(timer), Err(EvlError::NotFound));

    sched.register_timer(timer, &nop, timeout!(10 ms), 0).unwrap();
    assert_eq!(sched.deregister_timer(timer), Ok(()));
    assert_eq!(sched.deregister_timer(timer), Err(EvlError::NotFound));
}

#[test]
fn timer_can_disarm_itself_while_firing() {
    let me: Cell<Option<TimerId>> = Cell::new(None);
    let once = Cell::new(0u32);
    let steady = Cell::new(0u32);
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let on_once = from_fn(|sched, _| {
        once.set(once.get() + 1);
        if let Some(id) = me.get() {
            sched.deregister_timer(id).unwrap();
        }
    });
    let on_steady = from_fn(|_, _| steady.set(steady.get() + 1));
    let sched = Scheduler::new(&flags, &clock);

    let one_shot = sched.create_timer().unwrap();
    let periodic = sched.create_timer().unwrap();
    me.set(Some(one_shot));
    sched.register_timer(one_shot, &on_once, timeout!(100 ms), 0).unwrap();
    sched.register_timer(periodic, &on_steady, timeout!(100 ms), 0).unwrap();

    assert_eq!(sched.run(timeout!(500 ms)), Err(EvlError::Timeout));
    assert_eq!(once.get(), 1);
    assert_eq!(steady.get(), 5);
    assert_eq!(sched.timer_count(), 1);
}

/// Re-arms itself with a doubled interval each time it fires.
struct Backoff {
    timer: Cell<Option<TimerId>>,
    delay: Cell<u32>,
    fired_at: RefCell<Vec<Tick>>,
}

impl<'a> Callback<'a> for Backoff {
    fn call(&'a self, sched: &Scheduler<'a>, _arg: usize) {
        self.fired_at.borrow_mut().push(sched.now());
        let Some(id) = self.timer.get() else {
            return;
        };
        self.delay.set(self.delay.get() * 2);
        sched
            .reschedule_timer(id, self, Timeout::from_millis(self.delay.get()), 0)
            .unwrap();
    }
}

#[test]
fn callback_can_rearm_itself() {
    let backoff = Backoff {
        timer: Cell::new(None),
        delay: Cell::new(100),
        fired_at: RefCell::new(Vec::new()),
    };
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let sched = Scheduler::new(&flags, &clock);

    let timer = sched.create_timer().unwrap();
    backoff.timer.set(Some(timer));
    sched.register_timer(timer, &backoff, timeout!(100 ms), 0).unwrap();

    assert_eq!(sched.run(timeout!(1000 ms)), Err(EvlError::Timeout));
    assert_eq!(*backoff.fired_at.borrow(), vec![Tick(100), Tick(300), Tick(700)]);
    assert_eq!(sched.timer_interval(timer), Some(800));
}

#[test]
fn wait_is_capped_by_remaining_budget() {
    let hits = Cell::new(0u32);
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let on_tick = from_fn(|_, _| hits.set(hits.get() + 1));
    let sched = Scheduler::new(&flags, &clock);

    let timer = sched.create_timer().unwrap();
    sched.register_timer(timer, &on_tick, timeout!(1 s), 0).unwrap();

    assert_eq!(sched.run(timeout!(250 ms)), Err(EvlError::Timeout));
    assert_eq!(clock.now(), Tick(250));
    assert_eq!(hits.get(), 0);
}

#[test]
fn zero_interval_timer_is_bounded_per_pass() {
    let hits = Cell::new(0u32);
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let on_tick = from_fn(|_, _| hits.set(hits.get() + 1));
    let config = SchedulerConfig::builder().max_timer_fires(5).build();
    let sched = Scheduler::with_config(&flags, &clock, config);

    let timer = sched.create_timer().unwrap();
    sched.register_timer(timer, &on_tick, Timeout::NO_WAIT, 0).unwrap();

    assert_eq!(sched.run(Timeout::NO_WAIT), Err(EvlError::Timeout));
    assert_eq!(hits.get(), 5);
}

#[test]
fn break_from_timer_ends_run() {
    let hits = Cell::new(0u32);
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let on_tick = from_fn(|sched, _| {
        hits.set(hits.get() + 1);
        sched.break_loop();
    });
    let sched = Scheduler::new(&flags, &clock);

    let timer = sched.create_timer().unwrap();
    sched.register_timer(timer, &on_tick, timeout!(100 ms), 0).unwrap();

    assert_eq!(sched.run(Timeout::Forever), Ok(()));
    assert_eq!(hits.get(), 1);
    assert!(!sched.is_break_requested());
}

#[test]
fn arg_is_passed_through() {
    let seen = Cell::new(0usize);
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let on_tick = from_fn(|_, arg| seen.set(seen.get() + arg));
    let sched = Scheduler::new(&flags, &clock);

    let a = sched.create_timer().unwrap();
    let b = sched.create_timer().unwrap();
    sched.register_timer(a, &on_tick, timeout!(100 ms), 1).unwrap();
    sched.register_timer(b, &on_tick, timeout!(100 ms), 40).unwrap();

    assert_eq!(sched.run(timeout!(100 ms)), Err(EvlError::Timeout));
    assert_eq!(seen.get(), 41);
}

static IDLE_CALLS: AtomicU32 = AtomicU32::new(0);

fn count_idle() {
    IDLE_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn idle_callback_runs_before_each_blocking_wait() {
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let nop = from_fn(|_, _| {});
    let config = SchedulerConfig::builder()
        .name("idle")
        .idle_callback(count_idle)
        .build();
    let sched = Scheduler::with_config(&flags, &clock, config);

    let timer = sched.create_timer().unwrap();
    sched.register_timer(timer, &nop, timeout!(100 ms), 0).unwrap();

    assert_eq!(sched.run(timeout!(300 ms)), Err(EvlError::Timeout));
    assert_eq!(IDLE_CALLS.load(Ordering::SeqCst), 3);
    assert_eq!(flags.blocking_waits(), 3);
}
