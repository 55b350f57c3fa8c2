//! Polling of hardware status bits

use crate::can::CanMode;
use crate::config::Timeout;
use crate::Error;

/// What a driver was waiting for when a busy-wait expired
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitCondition {
    /// CAN controller acknowledging the requested operating mode
    ModeChange(CanMode),
    /// CAN controller finishing its ongoing bus activity
    BusIdle,
    /// Space in the UART transmit buffer
    TransmitBuffer,
    /// UART transmit shift register draining
    TransmitComplete,
}

/// Spins until `ready` returns `true` or `timeout` expires.
pub(crate) fn poll_until(
    timeout: Timeout,
    condition: WaitCondition,
    mut ready: impl FnMut() -> bool,
) -> Result<(), Error> {
    match timeout {
        Timeout::Forever => {
            while !ready() {
                core::hint::spin_loop();
            }
            Ok(())
        }
        Timeout::Polls(limit) => {
            if ready() {
                return Ok(());
            }
            for _ in 0..limit {
                core::hint::spin_loop();
                if ready() {
                    return Ok(());
                }
            }
            warn!("gave up waiting for {} after {} polls", condition, limit);
            Err(Error::Timeout(condition))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bounded_wait_checks_once_plus_limit() {
        let mut checks = 0;
        let result = poll_until(Timeout::Polls(3), WaitCondition::BusIdle, || {
            checks += 1;
            false
        });
        assert_eq!(result, Err(Error::Timeout(WaitCondition::BusIdle)));
        assert_eq!(checks, 4);
    }

    #[test]
    fn bounded_wait_returns_as_soon_as_ready() {
        let mut checks = 0;
        let result = poll_until(Timeout::Polls(10), WaitCondition::TransmitBuffer, || {
            checks += 1;
            checks == 2
        });
        assert_eq!(result, Ok(()));
        assert_eq!(checks, 2);
    }

    #[test]
    fn unbounded_wait_spins_until_ready() {
        let mut checks = 0;
        let result = poll_until(Timeout::Forever, WaitCondition::TransmitComplete, || {
            checks += 1;
            checks == 100
        });
        assert_eq!(result, Ok(()));
        assert_eq!(checks, 100);
    }
}
