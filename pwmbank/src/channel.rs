use crate::Error;
use crate::manager::DEFAULT_PERIOD_US;
use crate::mcu::{Polarity, PwmPin, PwmTimer, SharedTimer};
use crate::util::{debug, warn};

/// One PWM output: a pin routed to a compare channel of a timer.
///
/// The pin and timer binding is fixed at construction and no hardware is
/// touched until [`setup`](Self::setup) is called. Percentage commands are
/// mapped linearly onto the pulse bounds set with
/// [`set_limits`](Self::set_limits) and written to the timer's compare
/// register.
///
/// Because the timer is shared with every other channel in the same group,
/// the channel never changes the timer's period itself.
pub struct PwmChannel<P, T> {
    pin: P,
    alternate_function: u8,
    timer: SharedTimer<T>,
    sub_channel: u8,
    min_signal: u32,
    max_signal: u32,
    polarity: Polarity,
    is_setup: bool,
}

impl<P: PwmPin, T: PwmTimer> PwmChannel<P, T> {
    pub fn new(pin: P, alternate_function: u8, timer: SharedTimer<T>, sub_channel: u8) -> Self {
        Self {
            pin,
            alternate_function,
            timer,
            sub_channel,
            min_signal: 0,
            max_signal: DEFAULT_PERIOD_US,
            polarity: Polarity::Normal,
            is_setup: false,
        }
    }

    /// Routes the pin to the timer and enables output generation on the
    /// compare channel.
    ///
    /// If the channel is already set up, a full [`reset`](Self::reset) is
    /// performed first, so calling this twice is equivalent to calling it
    /// once on a fresh channel.
    pub fn setup(&mut self) -> Result<(), Error> {
        if self.is_setup {
            self.reset()?;
        }
        self.pin.set_alternate_function(self.alternate_function)?;
        self.timer.lock(|timer| {
            timer
                .borrow_mut()
                .arm_compare_output(self.sub_channel, self.polarity)
        })?;
        self.is_setup = true;
        Ok(())
    }

    /// Disables output generation and restores the pin to its default state.
    ///
    /// Calling this on a channel that is not set up is a no-op. Both the
    /// timer and the pin are restored even if one of them fails; the first
    /// failure is returned.
    pub fn reset(&mut self) -> Result<(), Error> {
        if !self.is_setup {
            return Ok(());
        }
        let disarm = self
            .timer
            .lock(|timer| timer.borrow_mut().disarm(self.sub_channel));
        let pin = self.pin.reset();
        self.is_setup = false;
        disarm.and(pin)
    }

    /// Sets the minimum and maximum pulse length in microseconds.
    ///
    /// The bounds are stored verbatim. [`PwmManager`](crate::PwmManager)
    /// validates group settings before distributing them; callers that set
    /// limits directly own their consistency.
    pub fn set_limits(&mut self, min: u32, max: u32) {
        self.min_signal = min;
        self.max_signal = max;
    }

    /// The minimum and maximum pulse length in microseconds.
    pub fn limits(&self) -> (u32, u32) {
        (self.min_signal, self.max_signal)
    }

    pub fn is_setup(&self) -> bool {
        self.is_setup
    }

    pub(crate) fn set_polarity(&mut self, polarity: Polarity) {
        self.polarity = polarity;
    }

    /// Sets the output to the pulse width corresponding to the specified
    /// percentage of the configured pulse bounds.
    ///
    /// A percentage above 100 is clamped to 100. The command is ignored if
    /// the channel is not set up or if its pulse bounds are inverted.
    pub fn set(&mut self, percent: u8) {
        if !self.is_setup {
            warn!("ignoring percentage command on channel that is not set up");
            return;
        }
        if self.min_signal > self.max_signal {
            warn!(
                "ignoring percentage command, pulse bounds are inverted ({} > {})",
                self.min_signal, self.max_signal,
            );
            return;
        }
        let percent = if percent > 100 {
            warn!("percentage {} is out of range, clamping to 100", percent);
            100
        } else {
            percent
        };
        let range = u64::from(self.max_signal - self.min_signal);
        let width_us = self.min_signal + (range * u64::from(percent) / 100) as u32;
        debug!("setting pulse width to {} us", width_us);
        self.timer
            .lock(|timer| timer.borrow_mut().write_compare(self.sub_channel, width_us));
    }
}

impl<P: PwmPin, T: PwmTimer> embedded_hal::pwm::ErrorType for PwmChannel<P, T> {
    type Error = core::convert::Infallible;
}

impl<P: PwmPin, T: PwmTimer> embedded_hal::pwm::SetDutyCycle for PwmChannel<P, T> {
    fn max_duty_cycle(&self) -> u16 {
        100
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.set(duty.min(100) as u8);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcu::mock::{Handle, MockPin, MockTimer, PinOp, PinState, TimerState};
    use crate::mcu::shared;
    use embedded_hal::pwm::SetDutyCycle;

    fn channel() -> (
        PwmChannel<MockPin, MockTimer>,
        Handle<TimerState>,
        Handle<PinState>,
    ) {
        let timer = MockTimer::new();
        let timer_state = timer.state();
        let pin = MockPin::new();
        let pin_state = pin.state();
        let channel = PwmChannel::new(pin, 2, shared(timer), 0);
        (channel, timer_state, pin_state)
    }

    #[test]
    fn setup_routes_pin_and_arms_output() {
        let (mut channel, timer, pin) = channel();
        channel.setup().unwrap();
        assert!(channel.is_setup());
        pin.lock(|state| assert_eq!(state.borrow().ops, [PinOp::AlternateFunction(2)]));
        timer.lock(|state| assert_eq!(state.borrow().armed[0], Some(Polarity::Normal)));
    }

    #[test]
    fn setup_again_resets_first() {
        let (mut channel, timer, pin) = channel();
        channel.setup().unwrap();
        channel.setup().unwrap();
        assert!(channel.is_setup());
        pin.lock(|state| {
            assert_eq!(
                state.borrow().ops,
                [
                    PinOp::AlternateFunction(2),
                    PinOp::Reset,
                    PinOp::AlternateFunction(2),
                ]
            );
        });
        timer.lock(|state| assert_eq!(state.borrow().armed[0], Some(Polarity::Normal)));
    }

    #[test]
    fn setup_propagates_pin_failure() {
        let (mut channel, _timer, pin) = channel();
        pin.lock(|state| state.borrow_mut().fail_alternate_function = true);
        assert_eq!(channel.setup(), Err(Error::HardwareConfiguration));
        assert!(!channel.is_setup());
    }

    #[test]
    fn reset_is_idempotent() {
        let (mut channel, timer, pin) = channel();
        channel.setup().unwrap();
        channel.reset().unwrap();
        channel.reset().unwrap();
        assert!(!channel.is_setup());
        pin.lock(|state| {
            assert_eq!(
                state.borrow().ops,
                [PinOp::AlternateFunction(2), PinOp::Reset]
            );
        });
        timer.lock(|state| assert_eq!(state.borrow().armed[0], None));
    }

    #[test]
    fn reset_restores_pin_even_if_disarm_failed() {
        // MockTimer::disarm cannot fail, so exercise the opposite order: a
        // failing pin must not prevent the disarm from happening.
        let (mut channel, timer, pin) = channel();
        channel.setup().unwrap();
        pin.lock(|state| state.borrow_mut().fail_reset = true);
        assert_eq!(channel.reset(), Err(Error::HardwareConfiguration));
        assert!(!channel.is_setup());
        timer.lock(|state| assert_eq!(state.borrow().armed[0], None));
    }

    #[test]
    fn percentage_maps_linearly_onto_limits() {
        let (mut channel, timer, _pin) = channel();
        channel.set_limits(1000, 2000);
        channel.setup().unwrap();
        channel.set(0);
        channel.set(50);
        channel.set(100);
        timer.lock(|state| {
            assert_eq!(state.borrow().writes, [(0, 1000), (0, 1500), (0, 2000)]);
        });
    }

    #[test]
    fn pulse_width_is_monotone_in_percentage() {
        let (mut channel, timer, _pin) = channel();
        channel.set_limits(900, 2100);
        channel.setup().unwrap();
        for percent in 0..=100 {
            channel.set(percent);
        }
        timer.lock(|state| {
            let state = state.borrow();
            assert!(state.writes.windows(2).all(|pair| pair[0].1 <= pair[1].1));
            assert_eq!(state.writes.first(), Some(&(0, 900)));
            assert_eq!(state.writes.last(), Some(&(0, 2100)));
        });
    }

    #[test]
    fn percentage_above_100_is_clamped() {
        let (mut channel, timer, _pin) = channel();
        channel.set_limits(1000, 2000);
        channel.setup().unwrap();
        channel.set(150);
        timer.lock(|state| assert_eq!(state.borrow().writes, [(0, 2000)]));
    }

    #[test]
    fn set_before_setup_writes_nothing() {
        let (mut channel, timer, _pin) = channel();
        channel.set_limits(1000, 2000);
        channel.set(50);
        timer.lock(|state| assert!(state.borrow().writes.is_empty()));
    }

    #[test]
    fn set_with_inverted_limits_writes_nothing() {
        let (mut channel, timer, _pin) = channel();
        channel.set_limits(2000, 1000);
        channel.setup().unwrap();
        channel.set(50);
        timer.lock(|state| assert!(state.borrow().writes.is_empty()));
    }

    #[test]
    fn implements_set_duty_cycle() {
        let (mut channel, timer, _pin) = channel();
        channel.set_limits(1000, 2000);
        channel.setup().unwrap();
        assert_eq!(channel.max_duty_cycle(), 100);
        channel.set_duty_cycle(25).unwrap();
        timer.lock(|state| assert_eq!(state.borrow().writes, [(0, 1250)]));
    }
}
