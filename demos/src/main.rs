//! evl host demo
//!
//! Wires the pieces a small connected device runs on one cooperative loop:
//! a blinking LED timer, a button fed from another thread, a sensor job
//! offloaded to a helper thread, and a blocking publish that waits for an
//! acknowledgement without stalling the rest of the loop. Ctrl-C stops it.

mod request;
mod worker;

use std::cell::Cell;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{debug, info, warn};
use thiserror::Error;

use evl_posix::{post_on_interrupt, HostPort, PortError, StdEventFlags};
use evl_reactor::{
    from_fn, EventFlags, EventMask, EvlError, Scheduler, SchedulerConfig, Timeout,
};

use request::Broker;
use worker::Worker;

const BUTTON: EventMask = EventMask::bit(0);
const SAMPLE_DONE: EventMask = EventMask::bit(1);
const PUBLISH_ACK: EventMask = EventMask::bit(2);
const SHUTDOWN: EventMask = EventMask::bit(31);

#[derive(Debug, Error)]
pub enum DemoError {
    #[error(transparent)]
    Port(#[from] PortError),
    #[error("event loop error: {0}")]
    Loop(#[from] EvlError),
    #[error("no acknowledgement within {0}")]
    NoAck(Timeout),
    #[error("request interrupted before acknowledgement")]
    Interrupted,
}

#[derive(Parser, Debug)]
#[command(name = "evl-demo", about = "Cooperative event loop demo")]
struct Opts {
    /// Stop after this many seconds; 0 runs until Ctrl-C
    #[arg(long, default_value_t = 10)]
    seconds: u32,

    /// LED blink period in milliseconds
    #[arg(long, default_value_t = 500)]
    blink_ms: u32,

    /// Sensor sampling interval in milliseconds
    #[arg(long, default_value_t = 2000)]
    sample_ms: u32,

    /// Number of simulated button presses
    #[arg(long, default_value_t = 4)]
    presses: u32,
}

fn read_sensor() -> u32 {
    thread::sleep(Duration::from_millis(300));
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    200 + nanos % 100
}

fn spawn_button(poster: Arc<StdEventFlags>, presses: u32) {
    thread::spawn(move || {
        for press in 0..presses {
            thread::sleep(Duration::from_millis(1500 + 250 * u64::from(press)));
            if let Err(err) = poster.post(BUTTON) {
                warn!("button post failed: {}", err);
            }
        }
    });
}

fn main() -> Result<(), DemoError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts = Opts::parse();

    let port = HostPort::new();
    post_on_interrupt(port.poster(), SHUTDOWN)?;

    let led = Cell::new(false);
    let presses = Cell::new(0u32);
    let sampler = Worker::new(
        "sampler",
        SAMPLE_DONE,
        Timeout::from_millis(opts.sample_ms),
        read_sensor,
        port.poster(),
    );
    let broker = Broker::new(port.poster(), PUBLISH_ACK, Duration::from_millis(150));

    let on_blink = from_fn(|_, _| {
        led.set(!led.get());
        debug!("led {}", if led.get() { "on" } else { "off" });
    });
    let on_button = from_fn(|sched, _| {
        presses.set(presses.get() + 1);
        info!("button press {}", presses.get());

        let payload = format!("press={} sample={:?}", presses.get(), sampler.last());
        if let Err(err) = broker.publish(sched, &payload, Timeout::from_secs(1)) {
            warn!("publish failed: {}", err);
        }

        // odd presses sample now, even presses speed sampling up
        if presses.get() % 2 == 1 {
            sampler.trigger(sched);
        } else if let Err(err) =
            sampler.change_interval(sched, Timeout::from_millis(opts.sample_ms / 2))
        {
            warn!("cannot change sampling interval: {}", err);
        }
    });
    let on_ack = from_fn(|sched, _| {
        if !sched.interrupt_if_awaited(PUBLISH_ACK) {
            debug!("stray acknowledgement");
        }
    });
    let on_shutdown = from_fn(|sched, _| {
        info!("shutdown requested");
        sched.break_loop();
    });

    let config = SchedulerConfig::builder().name("demo").build();
    let sched = Scheduler::with_config(port.flags(), port.clock(), config);

    let blink = sched.create_timer()?;
    sched.register_timer(blink, &on_blink, Timeout::from_millis(opts.blink_ms), 0)?;
    let button = sched.create_event()?;
    let ack = sched.create_event()?;
    let shutdown = sched.create_event()?;
    sched.register_event(button, &on_button, BUTTON, 0)?;
    sched.register_event(ack, &on_ack, PUBLISH_ACK, 0)?;
    sched.register_event(shutdown, &on_shutdown, SHUTDOWN, 0)?;
    sampler.start(&sched)?;
    spawn_button(port.poster(), opts.presses);

    let budget = match opts.seconds {
        0 => Timeout::Forever,
        secs => Timeout::from_secs(secs),
    };
    info!("running for {}", budget);
    match sched.run(budget) {
        Ok(()) => info!("stopped"),
        Err(EvlError::Timeout) => info!("time is up"),
        Err(err) => return Err(err.into()),
    }
    info!(
        "{} presses, {} samples, last {:?}",
        presses.get(),
        sampler.runs(),
        sampler.last()
    );
    Ok(())
}
