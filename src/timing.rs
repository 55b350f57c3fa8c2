//! CAN bit timing and UART baud rate arithmetic
//!
//! Everything in here is pure: the functions map a peripheral clock and a
//! requested rate to register field values and back, without touching
//! hardware.

use core::ops::RangeInclusive;
use fugit::HertzU32;

/// CAN bit timing parameters
///
/// A bit time consists of a synchronization segment of one time quantum
/// followed by the propagation segment and the two phase segments, all given
/// in time quanta. The length of one time quantum follows from the bit rate
/// and the segment lengths; see [`BitTiming::prescaler`].
///
/// This struct expects *real* segment lengths. The subtractions the hardware
/// fields need are handled by the driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitTiming {
    /// Nominal bit rate of the bus
    pub bit_rate: HertzU32,
    /// Propagation time segment
    pub propagation_seg: u8,
    /// Time before the sample point
    pub phase_seg_1: u8,
    /// Time after the sample point
    pub phase_seg_2: u8,
}

/// Misconfigurations of [`BitTiming`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitTimingError {
    /// Propagation segment is outside the wrapped `RangeInclusive`
    PropagationSegOutOfRange(RangeInclusive<u32>),
    /// Phase segment 1 is outside the wrapped `RangeInclusive`
    PhaseSeg1OutOfRange(RangeInclusive<u32>),
    /// Phase segment 2 is outside the wrapped `RangeInclusive`
    PhaseSeg2OutOfRange(RangeInclusive<u32>),
    /// Total bit time quanta is outside the wrapped `RangeInclusive`
    BitTimeOutOfRange(RangeInclusive<u32>),
    /// Prescaler is outside the wrapped `RangeInclusive`
    PrescalerOutOfRange(RangeInclusive<u32>),
    /// Requested bit rate is zero
    ZeroBitRate,
    /// The clock is too slow to divide into the requested bit time
    DivisorTooSmall {
        /// Provided peripheral clock
        clock: HertzU32,
        /// Time quanta per bit selected by [`BitTiming`]
        bit_time_quanta: u32,
    },
}

/// Valid values of a [`BitTiming`]
#[derive(Clone)]
pub(crate) struct BitTimingRanges {
    segment: RangeInclusive<u32>,
    /// The bit time, in time quanta
    time_quanta_per_bit: RangeInclusive<u32>,
    prescaler: RangeInclusive<u32>,
}

pub(crate) const BIT_TIMING_RANGES: BitTimingRanges = BitTimingRanges {
    segment: 1..=8,
    time_quanta_per_bit: 8..=25,
    prescaler: 1..=64,
};

impl BitTiming {
    /// Create an instance from the bit rate and the three segment lengths
    pub const fn new(
        bit_rate: HertzU32,
        propagation_seg: u8,
        phase_seg_1: u8,
        phase_seg_2: u8,
    ) -> Self {
        Self {
            bit_rate,
            propagation_seg,
            phase_seg_1,
            phase_seg_2,
        }
    }

    /// Returns the number of time quanta that make up one bit time, `t_bit /
    /// t_q`
    pub fn time_quanta_per_bit(&self) -> u32 {
        1 + u32::from(self.propagation_seg)
            + u32::from(self.phase_seg_1)
            + u32::from(self.phase_seg_2)
    }

    /// Validates the segment lengths.
    pub fn check(&self) -> Result<(), BitTimingError> {
        let valid = &BIT_TIMING_RANGES;
        if !valid.segment.contains(&self.propagation_seg.into()) {
            Err(BitTimingError::PropagationSegOutOfRange(
                valid.segment.clone(),
            ))
        } else if !valid.segment.contains(&self.phase_seg_1.into()) {
            Err(BitTimingError::PhaseSeg1OutOfRange(valid.segment.clone()))
        } else if !valid.segment.contains(&self.phase_seg_2.into()) {
            Err(BitTimingError::PhaseSeg2OutOfRange(valid.segment.clone()))
        } else if !valid
            .time_quanta_per_bit
            .contains(&self.time_quanta_per_bit())
        {
            Err(BitTimingError::BitTimeOutOfRange(
                valid.time_quanta_per_bit.clone(),
            ))
        } else {
            Ok(())
        }
    }

    /// Bit rate divisor: the bit rate the controller runs at with a
    /// prescaler of one, `f_clk / (2 * bit_time_quanta)`.
    pub fn divisor(&self, clock: HertzU32) -> Result<u32, BitTimingError> {
        self.check()?;
        if self.bit_rate.raw() == 0 {
            return Err(BitTimingError::ZeroBitRate);
        }
        let bit_time_quanta = self.time_quanta_per_bit();
        let divisor = clock.raw() / (bit_time_quanta * 2);
        if divisor == 0 {
            return Err(BitTimingError::DivisorTooSmall {
                clock,
                bit_time_quanta,
            });
        }
        Ok(divisor)
    }

    /// Time quantum prescaler, `t_q = 2 * prescaler / f_clk`
    ///
    /// The division truncates, so the resulting bit rate is at or above the
    /// requested one.
    pub fn prescaler(&self, clock: HertzU32) -> Result<u8, BitTimingError> {
        let divisor = self.divisor(clock)?;
        let prescaler = divisor / self.bit_rate.raw();
        let valid = &BIT_TIMING_RANGES.prescaler;
        if !valid.contains(&prescaler) {
            return Err(BitTimingError::PrescalerOutOfRange(valid.clone()));
        }
        Ok(prescaler as u8)
    }
}

/// Bit rate a CAN controller clocked at `clock` runs at with the given
/// prescaler and bit time. Returns zero when either is zero.
pub fn effective_bit_rate(clock: HertzU32, prescaler: u32, bit_time_quanta: u32) -> HertzU32 {
    let denominator = prescaler.saturating_mul(bit_time_quanta).saturating_mul(2);
    if denominator == 0 {
        return HertzU32::from_raw(0);
    }
    HertzU32::from_raw(clock.raw() / denominator)
}

/// UART baud rate generator setting
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BaudRateGenerator {
    divisor: u32,
    high_speed: bool,
}

/// Misconfigurations of the UART baud rate
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BaudRateError {
    /// Requested baud rate is zero
    ZeroBaudRate,
    /// The divisor does not fit the generator
    DivisorOutOfRange {
        /// Computed divisor
        divisor: u32,
        /// Divisors the generator supports
        valid: RangeInclusive<u32>,
    },
}

const BRG_DIVISOR_RANGE: RangeInclusive<u32> = 1..=0x1_0000;

impl BaudRateGenerator {
    /// Picks the generator setting for `baud_rate`.
    ///
    /// When `f_clk / baud_rate` is a multiple of 16 the generator divides by
    /// 4 (high speed mode), otherwise by 16.
    pub fn compute(clock: HertzU32, baud_rate: u32) -> Result<Self, BaudRateError> {
        if baud_rate == 0 {
            return Err(BaudRateError::ZeroBaudRate);
        }
        let ratio = clock.raw() / baud_rate;
        let high_speed = ratio & 0xf == 0;
        let divisor = if high_speed { ratio >> 2 } else { ratio >> 4 };
        if !BRG_DIVISOR_RANGE.contains(&divisor) {
            return Err(BaudRateError::DivisorOutOfRange {
                divisor,
                valid: BRG_DIVISOR_RANGE,
            });
        }
        Ok(Self {
            divisor,
            high_speed,
        })
    }

    /// Rebuild the setting from the register values.
    pub fn from_registers(register: u16, high_speed: bool) -> Self {
        Self {
            divisor: u32::from(register) + 1,
            high_speed,
        }
    }

    /// Division factor applied on top of the 4x or 16x divider
    pub fn divisor(&self) -> u32 {
        self.divisor
    }

    /// Value of the BRG register, `divisor - 1`
    pub fn register(&self) -> u16 {
        // `divisor` is at least one and at most 0x1_0000
        (self.divisor - 1) as u16
    }

    /// Generator divides by 4 instead of 16
    pub fn high_speed(&self) -> bool {
        self.high_speed
    }

    /// Baud rate the generator produces from `clock`.
    pub fn effective_baud_rate(&self, clock: HertzU32) -> u32 {
        effective_baud_rate(self.register(), self.high_speed, clock)
    }
}

/// Baud rate produced by a BRG register value and speed mode.
pub fn effective_baud_rate(register: u16, high_speed: bool, clock: HertzU32) -> u32 {
    let per_count = clock.raw() / (u32::from(register) + 1);
    if high_speed {
        per_count >> 2
    } else {
        per_count >> 4
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use fugit::RateExtU32;

    #[test]
    fn segment_triples_are_accepted_iff_bit_time_in_range() {
        for propagation_seg in 1..=8 {
            for phase_seg_1 in 1..=8 {
                for phase_seg_2 in 1..=8 {
                    let timing =
                        BitTiming::new(500.kHz(), propagation_seg, phase_seg_1, phase_seg_2);
                    let quanta = u32::from(propagation_seg + phase_seg_1 + phase_seg_2) + 1;
                    assert_eq!(timing.time_quanta_per_bit(), quanta);
                    if (8..=25).contains(&quanta) {
                        assert_eq!(timing.check(), Ok(()));
                    } else {
                        assert_eq!(
                            timing.check(),
                            Err(BitTimingError::BitTimeOutOfRange(8..=25))
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn segments_out_of_range_are_rejected_without_clamping() {
        let check = |p, s1, s2| BitTiming::new(500.kHz(), p, s1, s2).check();
        assert_eq!(
            check(0, 4, 4),
            Err(BitTimingError::PropagationSegOutOfRange(1..=8))
        );
        assert_eq!(check(4, 9, 4), Err(BitTimingError::PhaseSeg1OutOfRange(1..=8)));
        assert_eq!(check(4, 4, 0), Err(BitTimingError::PhaseSeg2OutOfRange(1..=8)));
    }

    #[test]
    fn can_divisor_and_prescaler() {
        let timing = BitTiming::new(500.kHz(), 3, 3, 2);
        let clock: HertzU32 = 40.MHz();
        assert_eq!(timing.time_quanta_per_bit(), 9);
        assert_eq!(timing.divisor(clock), Ok(2_222_222));
        assert_eq!(timing.prescaler(clock), Ok(4));
        assert_eq!(effective_bit_rate(clock, 4, 9), HertzU32::from_raw(555_555));
    }

    #[test]
    fn degenerate_can_inputs() {
        assert_eq!(
            BitTiming::new(0.Hz(), 3, 3, 2).divisor(40.MHz()),
            Err(BitTimingError::ZeroBitRate)
        );
        assert_eq!(
            BitTiming::new(500.kHz(), 3, 3, 2).divisor(10.Hz()),
            Err(BitTimingError::DivisorTooSmall {
                clock: 10.Hz(),
                bit_time_quanta: 9,
            })
        );
        // 1 Mbit/s can not be reached with 25 quanta from 40 MHz
        assert_eq!(
            BitTiming::new(1.MHz(), 8, 8, 8).prescaler(40.MHz()),
            Err(BitTimingError::PrescalerOutOfRange(1..=64))
        );
        // 10 kbit/s needs a prescaler above 64 from 40 MHz
        assert_eq!(
            BitTiming::new(10.kHz(), 3, 3, 2).prescaler(40.MHz()),
            Err(BitTimingError::PrescalerOutOfRange(1..=64))
        );
        assert_eq!(effective_bit_rate(40.MHz(), 0, 9).raw(), 0);
    }

    #[test]
    fn uart_low_speed_scenario() {
        let brg = BaudRateGenerator::compute(80.MHz(), 9600).unwrap();
        assert!(!brg.high_speed());
        assert_eq!(brg.divisor(), 520);
        assert_eq!(brg.register(), 519);
        assert_eq!(brg.effective_baud_rate(80.MHz()), 9615);
        assert_eq!(effective_baud_rate(519, false, 80.MHz()), 9615);
    }

    #[test]
    fn uart_high_speed_when_ratio_is_a_multiple_of_16() {
        // 80 MHz / 1 250 000 = 64
        let brg = BaudRateGenerator::compute(80.MHz(), 1_250_000).unwrap();
        assert!(brg.high_speed());
        assert_eq!(brg.divisor(), 16);
        assert_eq!(brg.effective_baud_rate(80.MHz()), 1_250_000);
    }

    #[test]
    fn uart_speed_mode_follows_low_nibble_of_ratio() {
        let clock: HertzU32 = 40.MHz();
        for baud in [300, 1200, 2400, 9600, 19_200, 57_600, 115_200, 156_250, 625_000] {
            let ratio = clock.raw() / baud;
            let brg = BaudRateGenerator::compute(clock, baud).unwrap();
            assert_eq!(brg.high_speed(), ratio & 0xf == 0, "baud {}", baud);
        }
    }

    #[test]
    fn effective_baud_rate_is_within_truncation_error() {
        let clock: HertzU32 = 80.MHz();
        for baud in [1200, 4800, 9600, 19_200, 38_400, 57_600, 115_200, 230_400] {
            let brg = BaudRateGenerator::compute(clock, baud).unwrap();
            let effective = brg.effective_baud_rate(clock);
            let tolerance = baud / brg.divisor() + 2;
            assert!(
                effective + tolerance >= baud && effective <= baud + tolerance,
                "baud {} effective {}",
                baud,
                effective
            );
        }
    }

    #[test]
    fn uart_degenerate_inputs() {
        assert_eq!(
            BaudRateGenerator::compute(80.MHz(), 0),
            Err(BaudRateError::ZeroBaudRate)
        );
        // ratio 8 is not a multiple of 16 and shifts down to zero
        assert_eq!(
            BaudRateGenerator::compute(80.MHz(), 10_000_000),
            Err(BaudRateError::DivisorOutOfRange {
                divisor: 0,
                valid: 1..=0x1_0000,
            })
        );
        // 80 MHz / 49 = 1 632 653, shifted down by 4 is 102 040
        assert!(matches!(
            BaudRateGenerator::compute(80.MHz(), 49),
            Err(BaudRateError::DivisorOutOfRange { divisor: 102_040, .. })
        ));
    }

    #[test]
    fn registers_rebuild_the_setting() {
        let brg = BaudRateGenerator::from_registers(519, false);
        assert_eq!(brg, BaudRateGenerator::compute(80.MHz(), 9600).unwrap());
    }
}
