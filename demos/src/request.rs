//! Blocking request/acknowledge over the event loop.
//!
//! A fake broker thread answers each request after a delay by posting the
//! acknowledgement bit. The caller waits in a nested loop, so timers and
//! unrelated events keep being served while the request is outstanding.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use evl_posix::StdEventFlags;
use evl_reactor::{EventFlags, EventMask, EvlError, Scheduler, Timeout};

use crate::DemoError;

pub struct Broker {
    flags: Arc<StdEventFlags>,
    ack: EventMask,
    latency: Duration,
}

impl Broker {
    pub fn new(flags: Arc<StdEventFlags>, ack: EventMask, latency: Duration) -> Self {
        Self {
            flags,
            ack,
            latency,
        }
    }

    /// Send `payload` and wait up to `timeout` for the acknowledgement.
    pub fn publish(
        &self,
        sched: &Scheduler<'_>,
        payload: &str,
        timeout: Timeout,
    ) -> Result<(), DemoError> {
        let flags = Arc::clone(&self.flags);
        let ack = self.ack;
        let latency = self.latency;
        debug!("publish {:?}", payload);
        thread::spawn(move || {
            thread::sleep(latency);
            if let Err(err) = flags.post(ack) {
                warn!("broker acknowledgement post failed: {}", err);
            }
        });

        match sched.run_until(self.ack, timeout) {
            Ok(hits) if hits.contains(self.ack) => {
                info!("publish {:?} acknowledged", payload);
                Ok(())
            }
            Ok(_) => Err(DemoError::Interrupted),
            Err(EvlError::Timeout) => Err(DemoError::NoAck(timeout)),
            Err(err) => Err(err.into()),
        }
    }
}
