//! Driver configuration

use crate::Error;
use core::ops::RangeInclusive;

/// Interrupt controller priorities that leave the interrupt active
pub const INTERRUPT_PRIORITIES: RangeInclusive<u8> = 1..=7;

/// How long a driver busy-waits on a hardware status bit
///
/// Mode changes of the CAN controller and UART transmit paths wait for the
/// hardware to acknowledge a request. A peripheral that never acknowledges
/// hangs the caller under [`Timeout::Forever`]; [`Timeout::Polls`] bounds the
/// wait and turns it into [`Error::Timeout`].
///
/// [`Error::Timeout`]: crate::Error::Timeout
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timeout {
    /// Poll until the condition holds
    #[default]
    Forever,
    /// Give up after the condition was checked this many times past the
    /// first check
    Polls(u32),
}

/// Configuration shared by all instances of a peripheral table
///
/// Default values are:
/// - timeout: [`Timeout::Forever`]
/// - rx_interrupt_priority: 6
/// - tx_interrupt_priority: 5
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Bound applied to every busy-wait
    pub timeout: Timeout,
    /// Interrupt controller priority of the UART receive interrupt. Must be
    /// above `tx_interrupt_priority`, see [`Config::check`].
    pub rx_interrupt_priority: u8,
    /// Interrupt controller priority of the UART transmit interrupt
    pub tx_interrupt_priority: u8,
}

impl Config {
    /// Create an instance with the default values.
    pub const fn new() -> Self {
        Self {
            timeout: Timeout::Forever,
            rx_interrupt_priority: 6,
            tx_interrupt_priority: 5,
        }
    }

    /// Replace the busy-wait bound.
    pub const fn with_timeout(self, timeout: Timeout) -> Self {
        Self { timeout, ..self }
    }

    /// Validates the interrupt priorities.
    ///
    /// Both must lie in [`INTERRUPT_PRIORITIES`], and the receive interrupt
    /// must rank strictly above the transmit interrupt.
    pub fn check(&self) -> Result<(), Error> {
        let (receive, transmit) = (self.rx_interrupt_priority, self.tx_interrupt_priority);
        if !INTERRUPT_PRIORITIES.contains(&receive)
            || !INTERRUPT_PRIORITIES.contains(&transmit)
            || receive <= transmit
        {
            return Err(Error::InterruptPriority { receive, transmit });
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn priorities(receive: u8, transmit: u8) -> Config {
        Config {
            rx_interrupt_priority: receive,
            tx_interrupt_priority: transmit,
            ..Config::new()
        }
    }

    #[test]
    fn default_priorities_are_valid() {
        assert_eq!(Config::default().check(), Ok(()));
        assert_eq!(priorities(7, 1).check(), Ok(()));
    }

    #[test]
    fn receive_must_rank_above_transmit() {
        for (receive, transmit) in [(2, 3), (4, 4), (8, 5), (6, 0)] {
            assert_eq!(
                priorities(receive, transmit).check(),
                Err(Error::InterruptPriority { receive, transmit })
            );
        }
    }
}
