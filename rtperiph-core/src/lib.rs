#![no_std]
#![warn(missing_docs)]

//! `rtperiph-core` provides the thin integration layer between the platform
//! independent [`rtperiph`] crate and chip specific HAL crates (in
//! documentation also referred to as _target HALs_).
//!
//! The traits here describe the two collaborators the peripheral drivers
//! cannot know about on their own: the clock subsystem feeding each
//! peripheral bus and the register block of every physical peripheral
//! instance. The drivers only ever see opaque register words; the bit layout
//! of those words is defined by `rtperiph`, the addresses and widths are
//! defined by the target HAL.
//!
//! Integrators of this crate into any given target HAL are responsible for
//! soundness of the trait implementations and conforming to their respective
//! safety prerequisites.
//!
//! [`rtperiph`]: <https://docs.rs/crate/rtperiph/>

pub use fugit;

/// Clock buses a peripheral can be fed from
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockBus {
    /// System clock
    System,
    /// Peripheral bus clock, feeds the UARTs
    Peripheral,
    /// Clock feeding the CAN controllers
    Can,
}

/// Trait representing the clock subsystem
///
/// The drivers query the frequency of the relevant bus right before
/// computing a divisor, so an implementation may track runtime clock
/// changes. Returning zero is allowed; timing computations reject it as a
/// degenerate divisor.
///
/// # Example
/// ```no_run
/// use fugit::{HertzU32, RateExtU32};
/// use rtperiph_core::{ClockBus, ClockSource};
///
/// struct Clocks {
///     sysclk: HertzU32,
/// }
///
/// impl ClockSource for Clocks {
///     fn frequency(&self, bus: ClockBus) -> HertzU32 {
///         match bus {
///             ClockBus::System => self.sysclk,
///             ClockBus::Peripheral | ClockBus::Can => {
///                 HertzU32::from_raw(self.sysclk.raw() / 2)
///             }
///         }
///     }
/// }
///
/// let clocks = Clocks { sysclk: 160.MHz() };
/// assert_eq!(clocks.frequency(ClockBus::Peripheral).to_MHz(), 80);
/// ```
pub trait ClockSource {
    /// Frequency of the clock feeding `bus`.
    fn frequency(&self, bus: ClockBus) -> fugit::HertzU32;
}

impl<T: ClockSource + ?Sized> ClockSource for &T {
    fn frequency(&self, bus: ClockBus) -> fugit::HertzU32 {
        (**self).frequency(bus)
    }
}

/// Register access for one CAN controller instance
///
/// The words exchanged through this trait are the raw contents of the
/// control register (`CiCON`) and the bit configuration register (`CiCFG`).
/// Requests for an operating mode are made by writing the control register;
/// the acknowledged mode is read back from it, so reads must reflect the
/// live hardware state and not a cached copy.
///
/// # Safety
/// While a value implementing this trait exists
/// - it must be the sole accessor of the control and bit configuration
///   registers and of the global interrupt enable of its instance
/// - the instance's clock and pins must stay configured
pub unsafe trait CanRegisters {
    /// Reads the control register.
    fn control(&self) -> u32;
    /// Writes the control register.
    fn set_control(&mut self, bits: u32);
    /// Reads the bit configuration register.
    fn bit_config(&self) -> u32;
    /// Writes the bit configuration register.
    fn set_bit_config(&mut self, bits: u32);
    /// Masks or unmasks the instance's global interrupt.
    fn set_interrupt_enabled(&mut self, enabled: bool);
}

/// UART interrupt sources
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartInterrupt {
    /// Receive data ready
    Receive,
    /// Transmit complete
    Transmit,
}

/// Register access used by the foreground side of one UART instance
///
/// The words exchanged are the mode register (`UxMODE`), the status and
/// control register (`UxSTA`) and the baud rate generator (`UxBRG`).
///
/// # Safety
/// While a value implementing this trait exists
/// - it must be the sole accessor of the mode, baud rate generator and
///   transmit registers, and of the interrupt priority, flag and enable bits
///   of its instance
/// - status reads must reflect the live hardware state
pub unsafe trait UartRegisters {
    /// Reads the mode register.
    fn mode(&self) -> u32;
    /// Writes the mode register.
    fn set_mode(&mut self, bits: u32);
    /// Reads the status and control register.
    fn status(&self) -> u32;
    /// Writes the status and control register.
    fn set_status(&mut self, bits: u32);
    /// Reads the baud rate generator register.
    fn baud_divisor(&self) -> u16;
    /// Writes the baud rate generator register.
    fn set_baud_divisor(&mut self, brg: u16);
    /// Writes a word into the transmit register.
    fn transmit(&mut self, word: u16);
    /// Sets the priority of `interrupt` in the interrupt controller.
    fn set_interrupt_priority(&mut self, interrupt: UartInterrupt, priority: u8);
    /// Clears the pending flag of `interrupt`.
    fn clear_interrupt_flag(&mut self, interrupt: UartInterrupt);
    /// Masks or unmasks `interrupt`.
    fn set_interrupt_enabled(&mut self, interrupt: UartInterrupt, enabled: bool);
}

/// Register access used by the receive interrupt of one UART instance
///
/// Kept apart from [`UartRegisters`] so the interrupt context can own it
/// while the foreground owns the rest of the instance.
///
/// # Safety
/// - it must be the sole accessor of the receive register and of the receive
///   interrupt flag of its instance
/// - [`UartReceiver::data_available`] must only read state, never write the
///   status register
pub unsafe trait UartReceiver {
    /// Returns `true` while the receive register holds unread data.
    fn data_available(&self) -> bool;
    /// Reads one word from the receive register.
    fn receive(&mut self) -> u16;
    /// Clears the pending receive interrupt flag.
    fn clear_receive_flag(&mut self);
}
