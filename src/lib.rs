#![no_std]
#![warn(missing_docs)]
//! # rtperiph
//!
//! ## Overview
//! This crate provides platform-agnostic drivers for the CAN controllers and
//! UARTs of the PIC24, dsPIC33 and PIC32 families.
//!
//! It provides the following features:
//!
//! - device tables that hand out [`DeviceHandle`]s for the peripheral
//!   instances of a chip, with instance counts checked at compile time
//! - the open / enable / disable / release lifecycle of every instance
//! - CAN bit timing and UART baud rate computation, see [`timing`]
//! - an interrupt-fed, lock-free receive ring buffer per UART
//! - `embedded-hal` serial traits on top of an allocated UART
//!
//! The drivers never address hardware directly. Every peripheral instance is
//! reached through a register port implementing one of the [`rtperiph_core`]
//! traits, and peripheral clock frequencies come from a
//! [`ClockSource`]. Target HALs are expected to implement these; their
//! safety requirements guarantee that the drivers have exclusive access to
//! the instances they were handed.
//!
//! ## Busy-waits
//!
//! Mode changes of the CAN controllers and the UART transmit path wait for
//! the hardware to acknowledge a request. By default they wait forever; a
//! bound can be set through [`Config::timeout`], after which the operation
//! fails with [`Error::Timeout`].
//!
//! ## Logging
//!
//! With the `defmt` feature enabled, the drivers log allocation, mode
//! changes, computed divisors and dropped bytes through [`defmt`]. All public
//! types then also implement `defmt::Format`.
//!
//! ## CAN example
//!
//! ```no_run
//! # use rtperiph::core::{CanRegisters, ClockBus, ClockSource};
//! # use rtperiph::core::fugit::HertzU32;
//! # struct Clocks;
//! # impl ClockSource for Clocks {
//! #     fn frequency(&self, _: ClockBus) -> HertzU32 { HertzU32::from_raw(40_000_000) }
//! # }
//! # struct Can1;
//! # unsafe impl CanRegisters for Can1 {
//! #     fn control(&self) -> u32 { unimplemented!() }
//! #     fn set_control(&mut self, _: u32) { unimplemented!() }
//! #     fn bit_config(&self) -> u32 { unimplemented!() }
//! #     fn set_bit_config(&mut self, _: u32) { unimplemented!() }
//! #     fn set_interrupt_enabled(&mut self, _: bool) { unimplemented!() }
//! # }
//! use rtperiph::can::{CanMode, Cans};
//! use rtperiph::config::{Config, Timeout};
//! use rtperiph::prelude::*;
//! use rtperiph::timing::BitTiming;
//!
//! let config = Config::default().with_timeout(Timeout::Polls(10_000));
//! let mut cans = Cans::<_, _, 1>::new([Can1], Clocks, config);
//!
//! let can = cans.allocate().unwrap();
//! // Leaves the controller in configuration mode
//! cans.enable(can).unwrap();
//! cans.set_bit_timing(can, BitTiming::new(500.kHz(), 3, 3, 2)).unwrap();
//! cans.set_mode(can, CanMode::Normal).unwrap();
//! ```
//!
//! ## UART example
//!
//! The receive buffer is split into two ends: the [`Producer`] goes to the
//! receive interrupt handler inside an [`RxInterrupt`], the [`Consumer`]
//! stays with the UART table.
//!
//! ```no_run
//! # use rtperiph::core::{ClockBus, ClockSource, UartInterrupt, UartReceiver, UartRegisters};
//! # use rtperiph::core::fugit::HertzU32;
//! # struct Clocks;
//! # impl ClockSource for Clocks {
//! #     fn frequency(&self, _: ClockBus) -> HertzU32 { HertzU32::from_raw(80_000_000) }
//! # }
//! # struct Uart1;
//! # unsafe impl UartRegisters for Uart1 {
//! #     fn mode(&self) -> u32 { unimplemented!() }
//! #     fn set_mode(&mut self, _: u32) { unimplemented!() }
//! #     fn status(&self) -> u32 { unimplemented!() }
//! #     fn set_status(&mut self, _: u32) { unimplemented!() }
//! #     fn baud_divisor(&self) -> u16 { unimplemented!() }
//! #     fn set_baud_divisor(&mut self, _: u16) { unimplemented!() }
//! #     fn transmit(&mut self, _: u16) { unimplemented!() }
//! #     fn set_interrupt_priority(&mut self, _: UartInterrupt, _: u8) { unimplemented!() }
//! #     fn clear_interrupt_flag(&mut self, _: UartInterrupt) { unimplemented!() }
//! #     fn set_interrupt_enabled(&mut self, _: UartInterrupt, _: bool) { unimplemented!() }
//! # }
//! # struct Uart1Rx;
//! # unsafe impl UartReceiver for Uart1Rx {
//! #     fn data_available(&self) -> bool { unimplemented!() }
//! #     fn receive(&mut self) -> u16 { unimplemented!() }
//! #     fn clear_receive_flag(&mut self) { unimplemented!() }
//! # }
//! use core::fmt::Write as _;
//! use rtperiph::config::Config;
//! use rtperiph::generic_array::typenum::U64;
//! use rtperiph::rx_buffer::RxBuffer;
//! use rtperiph::uart::{Parity, RxInterrupt, UartPort, Uarts};
//!
//! let mut buffer = RxBuffer::<U64>::new();
//! let (producer, consumer) = buffer.split();
//! let mut rx_interrupt = RxInterrupt::new(Uart1Rx, producer);
//! let mut uarts = Uarts::<_, _, _, 1>::new(
//!     [UartPort::new(Uart1, consumer)],
//!     Clocks,
//!     Config::default(),
//! );
//!
//! let uart = uarts.allocate().unwrap();
//! uarts.set_baud_rate(uart, 115_200).unwrap();
//! uarts.set_framing(uart, 8, Parity::None, 1).unwrap();
//! uarts.enable(uart).unwrap();
//! writeln!(uarts.channel(uart).unwrap(), "hello").unwrap();
//!
//! // In the receive interrupt handler
//! rx_interrupt.on_interrupt();
//!
//! let mut line = [0; 64];
//! let received = uarts.read(uart, &mut line).unwrap();
//! ```
//!
//! [`ClockSource`]: rtperiph_core::ClockSource
//! [`Config::timeout`]: crate::config::Config::timeout
//! [`defmt`]: <https://docs.rs/defmt/>
//! [`Producer`]: crate::rx_buffer::Producer
//! [`Consumer`]: crate::rx_buffer::Consumer
//! [`RxInterrupt`]: crate::uart::RxInterrupt

// Must come first, the other modules use its macros
mod logging;

pub mod can;
pub mod config;
pub mod device;
/// Traits to bring into scope with a glob import
pub mod prelude;
pub mod reg;
pub mod rx_buffer;
pub mod timing;
pub mod uart;
mod wait;

pub use device::{DeviceClass, DeviceHandle, Error};
pub use embedded_hal;
pub use generic_array;
pub use rtperiph_core as core;
pub use wait::WaitCondition;
