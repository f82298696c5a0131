//! Dispatch throughput on simulated time

use core::cell::Cell;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use evl_posix::sim::{VirtualClock, VirtualFlags};
use evl_reactor::{from_fn, EventMask, Scheduler, Timeout, EVENT_SLOTS, TIMER_SLOTS};

fn bench_event_pass(c: &mut Criterion) {
    let hits = Cell::new(0u64);
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let on_bit = from_fn(|_, arg| hits.set(hits.get() + arg as u64));
    let sched = Scheduler::new(&flags, &clock);

    for n in 0..EVENT_SLOTS {
        let id = sched.create_event().unwrap();
        sched
            .register_event(id, &on_bit, EventMask::bit(n as u8), n)
            .unwrap();
    }

    c.bench_function("dispatch 32 events", |b| {
        b.iter(|| {
            sched.post(EventMask::ALL).unwrap();
            let _ = sched.run(black_box(Timeout::NO_WAIT));
        })
    });
}

fn bench_timer_pass(c: &mut Criterion) {
    let hits = Cell::new(0u64);
    let clock = VirtualClock::new();
    let flags = VirtualFlags::new(&clock);
    let on_tick = from_fn(|_, _| hits.set(hits.get() + 1));
    let sched = Scheduler::new(&flags, &clock);

    for n in 0..TIMER_SLOTS {
        let id = sched.create_timer().unwrap();
        sched
            .register_timer(id, &on_tick, Timeout::from_millis(1 + n as u32 % 4), 0)
            .unwrap();
    }

    c.bench_function("100 ms of 32 timers", |b| {
        b.iter(|| {
            let _ = sched.run(black_box(Timeout::from_millis(100)));
        })
    });
}

criterion_group!(benches, bench_event_pass, bench_timer_pass);
criterion_main!(benches);
