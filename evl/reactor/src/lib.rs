#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![forbid(unsafe_code)]

//! # evl reactor
//!
//! A single-threaded, allocation-free dispatcher that turns two kinds of
//! pending work into serialized callback execution:
//!
//! - **events**: bits posted into an [`EventFlags`](evl_core::EventFlags)
//!   primitive, possibly from another thread or an interrupt handler, and
//!   matched against registered event masks;
//! - **timers**: periodic callbacks with a fixed interval.
//!
//! Callbacks run to completion and may re-enter the scheduler, including
//! running a nested [`Scheduler::run`] to wait for one specific event on top
//! of an asynchronous protocol (see [`Scheduler::run_until`]).
//!
//! ## Module Overview
//! - [`callback`]  – the [`Callback`] capability invoked by the dispatcher.
//! - [`timer`]     – timer registry and deadline bookkeeping.
//! - [`event`]     – event registry and mask matching.
//! - [`config`]    – runtime configuration.
//! - [`scheduler`] – the dispatch loop.

pub mod callback;
pub mod config;
pub mod event;
pub mod scheduler;
pub mod timer;

pub use callback::{from_fn, Callback, FnCallback};
pub use config::{SchedulerConfig, SchedulerConfigBuilder};
pub use event::EventId;
pub use evl_core::*;
pub use scheduler::Scheduler;
pub use timer::TimerId;

/// Maximum number of timer descriptors per scheduler
pub const TIMER_SLOTS: usize = 32;

/// Maximum number of event descriptors per scheduler
pub const EVENT_SLOTS: usize = 32;

/// Longest finite timer interval in milliseconds.
///
/// Deadlines are compared with a signed wrapping difference, so a deadline
/// must stay less than half the tick range ahead of the clock.
pub const MAX_INTERVAL_MS: u32 = i32::MAX as u32;
