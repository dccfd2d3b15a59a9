//! Traits implemented by the board support code that owns the actual pin and
//! timer peripherals.

use crate::Error;
use core::cell::RefCell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use portable_atomic_util::Arc;

/// Output polarity of a PWM compare channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    /// The output is high while the counter is below the compare value.
    #[default]
    Normal,
    /// The output is low while the counter is below the compare value.
    Inverted,
}

/// An output pin that can be routed to a timer peripheral.
pub trait PwmPin {
    /// Routes the pin to the alternate function with the specified index.
    fn set_alternate_function(&mut self, alternate_function: u8) -> Result<(), Error>;

    /// Restores the pin to its default state.
    fn reset(&mut self) -> Result<(), Error>;
}

/// A timer peripheral driving one or more PWM compare channels.
///
/// A single timer has a single counter, so every compare channel it drives
/// shares the period set with [`set_period`](Self::set_period).
pub trait PwmTimer {
    /// Sets the period of the counter in microseconds.
    fn set_period(&mut self, period_us: u32) -> Result<(), Error>;

    /// Enables output generation on the specified compare channel.
    fn arm_compare_output(&mut self, sub_channel: u8, polarity: Polarity) -> Result<(), Error>;

    /// Disables output generation on the specified compare channel.
    fn disarm(&mut self, sub_channel: u8) -> Result<(), Error>;

    /// Writes the compare value for the specified channel, in microseconds.
    ///
    /// The write takes effect at the next counter update and cannot fail once
    /// the channel is armed.
    fn write_compare(&mut self, sub_channel: u8, width_us: u32);
}

/// Handle to a timer that is shared by all compare channels it drives.
pub type SharedTimer<T> = Arc<Mutex<CriticalSectionRawMutex, RefCell<T>>>;

/// Wraps a timer so it can be shared by several channels.
pub fn shared<T: PwmTimer>(timer: T) -> SharedTimer<T> {
    Arc::new(Mutex::new(RefCell::new(timer)))
}
