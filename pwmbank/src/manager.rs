use crate::Error;
use crate::channel::PwmChannel;
use crate::mcu::{Polarity, PwmPin, PwmTimer, SharedTimer, shared};
use crate::util::{error, info, unwrap};
use portable_atomic_util::Arc;

/// Number of PWM output channels in a bank.
pub const NUM_CHANNELS: usize = 12;

/// Number of timers driving a bank, one per [`PwmGroup`].
pub const NUM_GROUPS: usize = 5;

/// Period of the default 50 Hz output profile, in microseconds.
pub(crate) const DEFAULT_PERIOD_US: u32 = 20_000;

/// A set of channels driven by the same timer.
///
/// The grouping is fixed by how the timers' compare channels are wired to
/// the output pins: channels in a group share one counter and therefore
/// always run at the same frequency. Groups can be configured independently
/// of each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmGroup {
    /// Channel 0, alone on its timer.
    Pwm1,
    /// Channel 1, alone on its timer.
    Pwm2,
    /// Channels 2 and 3.
    Pwm3To4,
    /// Channels 4 to 7.
    Pwm5To8,
    /// Channels 8 to 11.
    Pwm9To12,
}

impl PwmGroup {
    pub const ALL: [Self; NUM_GROUPS] = [
        Self::Pwm1,
        Self::Pwm2,
        Self::Pwm3To4,
        Self::Pwm5To8,
        Self::Pwm9To12,
    ];

    /// Indices of the channels belonging to this group.
    pub const fn channels(self) -> &'static [usize] {
        match self {
            Self::Pwm1 => &[0],
            Self::Pwm2 => &[1],
            Self::Pwm3To4 => &[2, 3],
            Self::Pwm5To8 => &[4, 5, 6, 7],
            Self::Pwm9To12 => &[8, 9, 10, 11],
        }
    }

    const fn timer_index(self) -> usize {
        self as usize
    }
}

/// Timer and compare sub-channel driving each channel of the bank.
const CHANNEL_MAP: [(PwmGroup, u8); NUM_CHANNELS] = [
    (PwmGroup::Pwm1, 0),
    (PwmGroup::Pwm2, 0),
    (PwmGroup::Pwm3To4, 0),
    (PwmGroup::Pwm3To4, 1),
    (PwmGroup::Pwm5To8, 0),
    (PwmGroup::Pwm5To8, 1),
    (PwmGroup::Pwm5To8, 2),
    (PwmGroup::Pwm5To8, 3),
    (PwmGroup::Pwm9To12, 0),
    (PwmGroup::Pwm9To12, 1),
    (PwmGroup::Pwm9To12, 2),
    (PwmGroup::Pwm9To12, 3),
];

/// Timing configuration for a channel group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmGroupConfig {
    /// Period of the PWM waveform in microseconds.
    pub period: u32,
    /// Pulse length of a 0% command in microseconds.
    pub min_length: u32,
    /// Pulse length of a 100% command in microseconds.
    pub max_length: u32,
    /// Inverts the output polarity of every channel in the group.
    pub inverted: bool,
}

impl Default for PwmGroupConfig {
    /// The 50 Hz profile with full-range pulse bounds.
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD_US,
            min_length: 0,
            max_length: DEFAULT_PERIOD_US,
            inverted: false,
        }
    }
}

/// A pin handle together with the alternate function that routes it to its
/// timer.
pub struct PinBinding<P> {
    pub pin: P,
    pub alternate_function: u8,
}

impl<P> PinBinding<P> {
    pub const fn new(pin: P, alternate_function: u8) -> Self {
        Self {
            pin,
            alternate_function,
        }
    }
}

/// A bank of PWM output channels grouped by shared timer.
///
/// The bank owns its channels and timers for its whole lifetime; callers
/// only ever borrow channels through [`channel`](Self::channel). Group-level
/// timing is applied with [`configure`](Self::configure) and distributed to
/// every channel sharing the group's timer. Groups that were never
/// configured fall back to the 50 Hz profile when [`setup`](Self::setup)
/// runs.
///
/// All operations are synchronous register transactions. The bank performs
/// no internal locking across operations; in a multi-threaded or
/// interrupt-driven system the caller has to serialize access to it.
pub struct PwmManager<P, T> {
    channels: [PwmChannel<P, T>; NUM_CHANNELS],
    timers: [SharedTimer<T>; NUM_GROUPS],
    configured: [bool; NUM_GROUPS],
    is_setup: bool,
}

impl<P: PwmPin, T: PwmTimer> PwmManager<P, T> {
    /// Creates the bank from its five timers and the pin binding of each
    /// channel, in channel order.
    ///
    /// No hardware is touched until [`setup`](Self::setup) is called.
    pub fn new(timers: [T; NUM_GROUPS], bindings: [PinBinding<P>; NUM_CHANNELS]) -> Self {
        let timers = timers.map(shared);
        let mut bindings = bindings.map(Some);
        let channels = core::array::from_fn(|i| {
            let binding = unwrap!(bindings[i].take());
            let (group, sub_channel) = CHANNEL_MAP[i];
            PwmChannel::new(
                binding.pin,
                binding.alternate_function,
                Arc::clone(&timers[group.timer_index()]),
                sub_channel,
            )
        });
        Self {
            channels,
            timers,
            configured: [false; NUM_GROUPS],
            is_setup: false,
        }
    }

    /// Applies a timing configuration to every channel of a group.
    ///
    /// The period is programmed into the group's shared timer, so it applies
    /// to all member channels at once; the pulse bounds and polarity are
    /// distributed to each of them. Nothing is changed if the setting is
    /// inconsistent or the timer rejects the period.
    ///
    /// Call this before [`setup`](Self::setup) for every group that should
    /// not run with the default 50 Hz profile.
    pub fn configure(&mut self, group: PwmGroup, config: PwmGroupConfig) -> Result<(), Error> {
        if config.min_length > config.max_length || config.max_length > config.period {
            return Err(Error::InvalidArgument);
        }
        self.timers[group.timer_index()]
            .lock(|timer| timer.borrow_mut().set_period(config.period))?;
        let polarity = if config.inverted {
            Polarity::Inverted
        } else {
            Polarity::Normal
        };
        for &index in group.channels() {
            let channel = &mut self.channels[index];
            channel.set_limits(config.min_length, config.max_length);
            channel.set_polarity(polarity);
        }
        self.configured[group.timer_index()] = true;
        info!("configured group {} with a period of {} us", group, config.period);
        Ok(())
    }

    /// Sets up all channels of the bank, in channel order.
    ///
    /// If the bank is already set up, a full [`reset`](Self::reset) is
    /// performed first. Groups that were never configured get the default
    /// 50 Hz profile. The first channel failure aborts the sequence and is
    /// returned unchanged; channels set up before the failure stay set up,
    /// which a caller can observe through [`channel`](Self::channel) and
    /// clean up with [`reset`](Self::reset).
    pub fn setup(&mut self) -> Result<(), Error> {
        if self.is_setup {
            self.reset()?;
        }
        for group in PwmGroup::ALL {
            if !self.configured[group.timer_index()] {
                self.configure(group, PwmGroupConfig::default())?;
            }
        }
        for channel in &mut self.channels {
            channel.setup()?;
        }
        self.is_setup = true;
        info!("all {} PWM channels are set up", NUM_CHANNELS);
        Ok(())
    }

    /// Resets every channel of the bank to its default state.
    ///
    /// Remaining channels are still reset when one of them fails, so no
    /// output is left armed; the first failure is returned. Group
    /// configurations are kept and reused by the next [`setup`](Self::setup).
    pub fn reset(&mut self) -> Result<(), Error> {
        let mut result = Ok(());
        for channel in &mut self.channels {
            if let Err(e) = channel.reset() {
                error!("failed to reset channel: {}", e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        self.is_setup = false;
        result
    }

    /// Borrows the channel with the specified number.
    ///
    /// Returns [`None`] if the number is not in `0..NUM_CHANNELS`.
    pub fn channel(&mut self, num: usize) -> Option<&mut PwmChannel<P, T>> {
        self.channels.get_mut(num)
    }

    /// Sets every channel of the bank to the specified percentage.
    ///
    /// Currently infallible because percentage commands are fire-and-forget
    /// hardware writes; the `Result` is part of the signature so failures
    /// can be surfaced later without breaking callers.
    pub fn set_all(&mut self, percent: u8) -> Result<(), Error> {
        for channel in &mut self.channels {
            channel.set(percent);
        }
        Ok(())
    }

    pub fn is_setup(&self) -> bool {
        self.is_setup
    }
}
