//! Driver for banks of PWM output channels ganged onto shared timers.
//!
//! On the supported boards several output pins are wired to the compare
//! channels of a handful of timer peripherals. A timer has a single counter,
//! so the channels it drives always share their frequency; only the pulse
//! width of each channel is individual. [`PwmManager`] owns the fixed set of
//! channels, applies group-level timing configuration and fans out bulk
//! commands, while [`PwmChannel`] converts percentage commands into pulse
//! widths within its configured bounds.
//!
//! The pin and timer peripherals themselves are reached through the traits
//! in [`mcu`], implemented by board support code (or by mocks in tests).
//!
//! ## Feature flags
#![doc = document_features::document_features!()]
#![no_std]

extern crate alloc;

mod channel;
mod manager;
pub mod mcu;
pub mod util;

pub use channel::PwmChannel;
pub use manager::{NUM_CHANNELS, NUM_GROUPS, PinBinding, PwmGroup, PwmGroupConfig, PwmManager};

use derive_more::{Display, Error};

/// Failures reported by the pin and timer collaborators.
///
/// [`PwmChannel`] and [`PwmManager`] propagate these unchanged; they do not
/// add failure kinds of their own beyond the group-setting validation in
/// [`PwmManager::configure`].
#[derive(Clone, Copy, Debug, Display, Error, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The pin or timer rejected the requested configuration, e.g. a period
    /// that is not achievable with the timer's clock and prescaler.
    #[display("hardware rejected the requested configuration")]
    HardwareConfiguration,
    /// A group setting violates `min_length <= max_length <= period`.
    #[display("inconsistent group setting")]
    InvalidArgument,
}
