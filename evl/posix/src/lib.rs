//! POSIX port of the evl event loop.
//!
//! Supplies the two platform seams the dispatcher needs on a hosted system:
//!
//! - [`MonotonicClock`]: millisecond ticks derived from [`std::time::Instant`];
//! - [`StdEventFlags`]: a flag word guarded by a mutex and condition variable,
//!   postable from any thread.
//!
//! [`sim`] provides a virtual clock and flag primitive for deterministic
//! tests, and [`post_on_interrupt`] bridges Ctrl-C into an event bit.

use std::sync::Arc;

use thiserror::Error;

pub mod flags;
pub mod signal;
pub mod sim;
pub mod time;

pub use flags::StdEventFlags;
pub use signal::post_on_interrupt;
pub use time::MonotonicClock;

/// Errors raised by the host port
#[derive(Debug, Error)]
pub enum PortError {
    #[error("failed to install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("event loop error: {0}")]
    Loop(#[from] evl_core::EvlError),
}

/// Clock and flag primitive for one scheduler thread.
///
/// The flags are reference counted so producer threads can hold their own
/// handle while the scheduler borrows them.
pub struct HostPort {
    clock: MonotonicClock,
    flags: Arc<StdEventFlags>,
}

impl HostPort {
    /// Creates a port whose clock starts at tick zero.
    pub fn new() -> Self {
        Self {
            clock: MonotonicClock::new(),
            flags: Arc::new(StdEventFlags::new()),
        }
    }

    pub fn clock(&self) -> &MonotonicClock {
        &self.clock
    }

    pub fn flags(&self) -> &StdEventFlags {
        &self.flags
    }

    /// Shared handle for posting from other threads.
    pub fn poster(&self) -> Arc<StdEventFlags> {
        Arc::clone(&self.flags)
    }
}

impl Default for HostPort {
    fn default() -> Self {
        Self::new()
    }
}
