#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![forbid(unsafe_code)]

//! # evl core
//!
//! Core types and traits shared by the evl event loop and its ports: event
//! bitmasks, wraparound-tolerant millisecond ticks, wait timeouts, and the two
//! platform seams the dispatcher blocks on (a monotonic [`Clock`] and a
//! multi-bit [`EventFlags`] signal).

use core::fmt;

pub mod flags;
pub mod mask;
pub mod time;

pub use flags::*;
pub use mask::*;
pub use time::*;

/// evl core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout evl
pub type EvlResult<T> = Result<T, EvlError>;

/// Error types for evl operations
///
/// None of these are fatal to the dispatcher; every failure is surfaced as a
/// return value for the caller to interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvlError {
    /// Descriptor is not linked into its registry
    NotFound,
    /// Overall run budget elapsed without an explicit stop
    Timeout,
    /// Underlying event-flag wait or post failed
    Primitive,
    /// Descriptor arena has no free slots
    RegistryFull,
    /// Handle index lies beyond the scheduler's descriptor arena
    InvalidHandle,
    /// Finite timer interval too long to order against the wrapping tick
    InvalidInterval,
}

impl fmt::Display for EvlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvlError::NotFound => write!(f, "Descriptor not registered"),
            EvlError::Timeout => write!(f, "Event loop timed out"),
            EvlError::Primitive => write!(f, "Event flag primitive failed"),
            EvlError::RegistryFull => write!(f, "Descriptor registry is full"),
            EvlError::InvalidHandle => write!(f, "Invalid descriptor handle"),
            EvlError::InvalidInterval => write!(f, "Timer interval out of range"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EvlError {}

#[cfg(feature = "defmt")]
impl defmt::Format for EvlError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            EvlError::NotFound => defmt::write!(fmt, "NotFound"),
            EvlError::Timeout => defmt::write!(fmt, "Timeout"),
            EvlError::Primitive => defmt::write!(fmt, "Primitive"),
            EvlError::RegistryFull => defmt::write!(fmt, "RegistryFull"),
            EvlError::InvalidHandle => defmt::write!(fmt, "InvalidHandle"),
            EvlError::InvalidInterval => defmt::write!(fmt, "InvalidInterval"),
        }
    }
}
