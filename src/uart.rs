//! UART lifecycle and data transfer
//!
//! [`Uarts`] owns the foreground side of every UART of the chip: the
//! register port and the reading end of the receive ring buffer. The
//! receiving interrupt side lives in [`RxInterrupt`], one per instance,
//! which moves incoming bytes from the hardware into the ring.

use crate::config::{Config, Timeout};
use crate::device::{DeviceClass, DeviceHandle, DeviceTable, Error, Instance, InstanceCount};
use crate::reg::{UartMode, UartStatus};
use crate::rx_buffer::{Consumer, Producer, RxCapacity};
use crate::timing::{self, BaudRateGenerator};
use crate::wait::{poll_until, WaitCondition};
use core::convert::Infallible;
use embedded_hal::{blocking, serial};
use rtperiph_core::{ClockBus, ClockSource, UartInterrupt, UartReceiver, UartRegisters};

/// Largest number of UARTs the supported parts carry
pub const MAX_INSTANCES: usize = 7;

/// Parity bit of a character
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Unsupported character framings
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FramingError {
    /// Only 8 and 9 data bits are supported
    UnsupportedDataBits(u8),
    /// Only 1 and 2 stop bits are supported
    UnsupportedStopBits(u8),
}

/// Character framing: data bits, parity and stop bits
///
/// Nine data bit characters never carry a parity bit; requesting one
/// settles for [`Parity::None`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Framing {
    data_bits: u8,
    parity: Parity,
    stop_bits: u8,
}

impl Framing {
    /// 8 data bits, no parity, 1 stop bit
    pub const DEFAULT: Self = Self {
        data_bits: 8,
        parity: Parity::None,
        stop_bits: 1,
    };

    /// Validate a framing.
    pub fn new(data_bits: u8, parity: Parity, stop_bits: u8) -> Result<Self, FramingError> {
        if !matches!(data_bits, 8 | 9) {
            return Err(FramingError::UnsupportedDataBits(data_bits));
        }
        if !matches!(stop_bits, 1 | 2) {
            return Err(FramingError::UnsupportedStopBits(stop_bits));
        }
        let parity = if data_bits == 9 && parity != Parity::None {
            warn!("9 data bits leave no room for parity, using none");
            Parity::None
        } else {
            parity
        };
        Ok(Self {
            data_bits,
            parity,
            stop_bits,
        })
    }

    /// Number of data bits, 8 or 9
    pub fn data_bits(&self) -> u8 {
        self.data_bits
    }

    /// Parity bit
    pub fn parity(&self) -> Parity {
        self.parity
    }

    /// Number of stop bits, 1 or 2
    pub fn stop_bits(&self) -> u8 {
        self.stop_bits
    }

    fn pdsel(&self) -> u8 {
        match (self.data_bits, self.parity) {
            (9, _) => 0b11,
            (_, Parity::None) => 0b00,
            (_, Parity::Even) => 0b01,
            (_, Parity::Odd) => 0b10,
        }
    }
}

impl Default for Framing {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Foreground side of one UART: its registers and the reading end of its
/// receive buffer
pub struct UartPort<'a, R, N: RxCapacity> {
    regs: R,
    rx: Consumer<'a, N>,
    baud_rate: u32,
    framing: Framing,
}

impl<'a, R: UartRegisters, N: RxCapacity> UartPort<'a, R, N> {
    /// Pair a register port with the consumer of the buffer its
    /// [`RxInterrupt`] fills.
    pub fn new(regs: R, rx: Consumer<'a, N>) -> Self {
        Self {
            regs,
            rx,
            baud_rate: 0,
            framing: Framing::DEFAULT,
        }
    }

    fn status(&self) -> UartStatus {
        UartStatus::from_bits(self.regs.status())
    }

    fn modify_mode(&mut self, f: impl FnOnce(&mut UartMode)) {
        let mut mode = UartMode::from_bits(self.regs.mode());
        f(&mut mode);
        self.regs.set_mode(mode.bits());
    }

    fn modify_status(&mut self, f: impl FnOnce(&mut UartStatus)) {
        let mut status = self.status();
        f(&mut status);
        self.regs.set_status(status.bits());
    }

    fn transmit(&mut self, word: u16, timeout: Timeout) -> Result<(), Error> {
        let regs = &self.regs;
        poll_until(timeout, WaitCondition::TransmitBuffer, || {
            !UartStatus::from_bits(regs.status()).utxbf()
        })?;
        self.regs.transmit(word);
        Ok(())
    }

    fn flush(&self, timeout: Timeout) -> Result<(), Error> {
        poll_until(timeout, WaitCondition::TransmitComplete, || {
            self.status().trmt()
        })
    }
}

impl<R, N: RxCapacity> Instance for UartPort<'_, R, N> {
    const CLASS: DeviceClass = DeviceClass::Uart;

    fn reset(&mut self) {
        self.baud_rate = 0;
        self.framing = Framing::DEFAULT;
        self.rx.clear();
    }
}

/// Table of the UARTs of a chip
///
/// `COUNT` is the number of UARTs present, at most [`MAX_INSTANCES`]. `N`
/// is the capacity of each receive buffer. `K` provides the frequency of the
/// [`ClockBus::Peripheral`] clock.
pub struct Uarts<'a, R, K, N: RxCapacity, const COUNT: usize> {
    table: DeviceTable<UartPort<'a, R, N>, COUNT>,
    clocks: K,
    config: Config,
}

impl<'a, R, K, N, const COUNT: usize> Uarts<'a, R, K, N, COUNT>
where
    R: UartRegisters,
    K: ClockSource,
    N: RxCapacity,
{
    /// Take ownership of the ports, in minor number order.
    ///
    /// No register is touched; all UARTs start out unallocated.
    pub fn new(ports: [UartPort<'a, R, N>; COUNT], clocks: K, config: Config) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = InstanceCount::<COUNT, MAX_INSTANCES>::CHECK;
        Self {
            table: DeviceTable::new(ports),
            clocks,
            config,
        }
    }

    /// Claims the first free UART, discarding anything left in its receive
    /// buffer. Returns `None` if all are in use.
    pub fn allocate(&mut self) -> Option<DeviceHandle> {
        self.table.allocate()
    }

    /// Claims the UART named by `handle`.
    pub fn open(&mut self, handle: DeviceHandle) -> Result<(), Error> {
        self.table.open(handle)
    }

    /// Gives a UART back, disabling it first if needed.
    ///
    /// Releasing a handle that names no UART, or a UART that is not
    /// allocated, does nothing.
    pub fn release(&mut self, handle: DeviceHandle) -> Result<(), Error> {
        let Ok(index) = self.table.index(handle) else {
            return Ok(());
        };
        let slot = self.table.slot(index);
        if !slot.is_used() {
            return Ok(());
        }
        if slot.is_enabled() {
            self.disable(handle)?;
        }
        self.table.free(index);
        debug!("released {}", handle);
        Ok(())
    }

    /// Returns `true` if `handle` names an allocated UART.
    pub fn is_allocated(&self, handle: DeviceHandle) -> bool {
        self.table.allocated(handle).is_ok()
    }

    /// Returns `true` if `handle` names an enabled UART.
    pub fn is_enabled(&self, handle: DeviceHandle) -> bool {
        self.table
            .allocated(handle)
            .map(|slot| slot.is_enabled())
            .unwrap_or(false)
    }

    /// Unmasks the receive and transmit interrupts and switches the module
    /// and its transmitter on.
    ///
    /// Fails without touching the hardware if the configured priorities do
    /// not pass [`Config::check`].
    pub fn enable(&mut self, handle: DeviceHandle) -> Result<(), Error> {
        let slot = self.table.allocated_mut(handle)?;
        self.config.check()?;
        let priorities = [
            (UartInterrupt::Receive, self.config.rx_interrupt_priority),
            (UartInterrupt::Transmit, self.config.tx_interrupt_priority),
        ];
        slot.set_enabled(true);
        let port = &mut slot.instance;
        for (interrupt, priority) in priorities {
            port.regs.clear_interrupt_flag(interrupt);
            port.regs.set_interrupt_priority(interrupt, priority);
            port.regs.set_interrupt_enabled(interrupt, true);
        }
        port.modify_mode(|mode| mode.set_on(true));
        port.modify_status(|status| status.set_utxen(true));
        debug!("enabled {}", handle);
        Ok(())
    }

    /// Masks the interrupts and switches the module off.
    pub fn disable(&mut self, handle: DeviceHandle) -> Result<(), Error> {
        let slot = self.table.allocated_mut(handle)?;
        slot.set_enabled(false);
        let port = &mut slot.instance;
        port.regs.set_interrupt_enabled(UartInterrupt::Receive, false);
        port.regs.set_interrupt_enabled(UartInterrupt::Transmit, false);
        port.modify_status(|status| status.set_utxen(false));
        port.modify_mode(|mode| mode.set_on(false));
        debug!("disabled {}", handle);
        Ok(())
    }

    /// Programs the baud rate generator for `baud_rate`.
    pub fn set_baud_rate(&mut self, handle: DeviceHandle, baud_rate: u32) -> Result<(), Error> {
        let clock = self.clocks.frequency(ClockBus::Peripheral);
        let port = &mut self.table.allocated_mut(handle)?.instance;
        let brg = BaudRateGenerator::compute(clock, baud_rate)?;
        debug!(
            "{}: BRG {} high speed {}",
            handle,
            brg.register(),
            brg.high_speed()
        );
        port.modify_mode(|mode| mode.set_brgh(brg.high_speed()));
        port.regs.set_baud_divisor(brg.register());
        port.baud_rate = baud_rate;
        Ok(())
    }

    /// Baud rate as last passed to [`Self::set_baud_rate`], zero if never set
    pub fn baud_rate(&self, handle: DeviceHandle) -> Result<u32, Error> {
        Ok(self.table.allocated(handle)?.instance.baud_rate)
    }

    /// Baud rate the generator actually produces, computed from the
    /// programmed registers. Zero while no baud rate has been set.
    pub fn effective_baud_rate(&self, handle: DeviceHandle) -> Result<u32, Error> {
        let port = &self.table.allocated(handle)?.instance;
        if port.baud_rate == 0 {
            return Ok(0);
        }
        let high_speed = UartMode::from_bits(port.regs.mode()).brgh();
        Ok(timing::effective_baud_rate(
            port.regs.baud_divisor(),
            high_speed,
            self.clocks.frequency(ClockBus::Peripheral),
        ))
    }

    /// Programs the character framing. See [`Framing::new`].
    pub fn set_framing(
        &mut self,
        handle: DeviceHandle,
        data_bits: u8,
        parity: Parity,
        stop_bits: u8,
    ) -> Result<(), Error> {
        let port = &mut self.table.allocated_mut(handle)?.instance;
        let framing = Framing::new(data_bits, parity, stop_bits)?;
        port.modify_mode(|mode| {
            mode.set_pdsel(framing.pdsel());
            mode.set_stsel(framing.stop_bits == 2);
        });
        port.framing = framing;
        Ok(())
    }

    /// Framing in effect
    pub fn framing(&self, handle: DeviceHandle) -> Result<Framing, Error> {
        Ok(self.table.allocated(handle)?.instance.framing)
    }

    /// Sends `bytes`, waiting for buffer space before each one. Returns the
    /// number of bytes queued for transmission.
    ///
    /// If the wait for buffer space times out after some bytes went out, the
    /// call stops there and returns their count; the rest can be passed to
    /// the next call. The timeout is only returned as an error when not even
    /// the first byte could be queued.
    pub fn write(&mut self, handle: DeviceHandle, bytes: &[u8]) -> Result<usize, Error> {
        let timeout = self.config.timeout;
        let port = &mut self.table.allocated_mut(handle)?.instance;
        for (sent, &byte) in bytes.iter().enumerate() {
            if let Err(error) = port.transmit(u16::from(byte), timeout) {
                if sent == 0 {
                    return Err(error);
                }
                trace!("{}: write stopped after {} bytes", handle, sent);
                return Ok(sent);
            }
        }
        Ok(bytes.len())
    }

    /// Sends one 9-bit word. Bits above the ninth are dropped.
    pub fn write_word(&mut self, handle: DeviceHandle, word: u16) -> Result<(), Error> {
        let timeout = self.config.timeout;
        let port = &mut self.table.allocated_mut(handle)?.instance;
        port.transmit(word & 0x1ff, timeout)
    }

    /// Waits until the last character has left the transmit shift register.
    pub fn flush(&mut self, handle: DeviceHandle) -> Result<(), Error> {
        let timeout = self.config.timeout;
        self.table.allocated(handle)?.instance.flush(timeout)
    }

    /// Moves received bytes into `buf`, oldest first. Returns the number of
    /// bytes moved, zero if nothing was received.
    pub fn read(&mut self, handle: DeviceHandle, buf: &mut [u8]) -> Result<usize, Error> {
        Ok(self.table.allocated_mut(handle)?.instance.rx.read(buf))
    }

    /// Number of received bytes waiting to be read
    pub fn data_ready(&self, handle: DeviceHandle) -> Result<usize, Error> {
        Ok(self.table.allocated(handle)?.instance.rx.len())
    }

    /// Acknowledges the transmit interrupt. Call from the handler of that
    /// interrupt.
    pub fn on_transmit_interrupt(&mut self, handle: DeviceHandle) -> Result<(), Error> {
        let port = &mut self.table.lookup_mut(handle)?.instance;
        port.regs.clear_interrupt_flag(UartInterrupt::Transmit);
        Ok(())
    }

    /// Borrow an allocated UART as an `embedded-hal` serial port.
    pub fn channel(&mut self, handle: DeviceHandle) -> Result<Channel<'_, 'a, R, N>, Error> {
        let timeout = self.config.timeout;
        let port = &mut self.table.allocated_mut(handle)?.instance;
        Ok(Channel { port, timeout })
    }

    /// Raw access to the registers of a UART.
    ///
    /// # Safety
    /// The abstraction assumes that it has exclusive ownership of the
    /// registers. Direct access can break such assumptions.
    pub unsafe fn registers(&self, handle: DeviceHandle) -> Result<&R, Error> {
        Ok(&self.table.lookup(handle)?.instance.regs)
    }

    /// Gives the ports back, in minor number order.
    pub fn free(self) -> [UartPort<'a, R, N>; COUNT] {
        self.table.into_instances()
    }
}

impl<'a, R, N: RxCapacity> UartPort<'a, R, N> {
    /// Split into the register port and the buffer consumer.
    pub fn free(self) -> (R, Consumer<'a, N>) {
        (self.regs, self.rx)
    }
}

/// One allocated UART viewed as an `embedded-hal` serial port
///
/// The [`serial`] traits never wait: they report
/// [`nb::Error::WouldBlock`] while the hardware is not ready.
/// [`core::fmt::Write`] waits like [`Uarts::write`] does.
pub struct Channel<'p, 'a, R, N: RxCapacity> {
    port: &'p mut UartPort<'a, R, N>,
    timeout: Timeout,
}

impl<R: UartRegisters, N: RxCapacity> serial::Read<u8> for Channel<'_, '_, R, N> {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.port.rx.pop().ok_or(nb::Error::WouldBlock)
    }
}

impl<R: UartRegisters, N: RxCapacity> serial::Write<u8> for Channel<'_, '_, R, N> {
    type Error = Infallible;

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        if self.port.status().utxbf() {
            return Err(nb::Error::WouldBlock);
        }
        self.port.regs.transmit(u16::from(word));
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        if self.port.status().trmt() {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}

impl<R: UartRegisters, N: RxCapacity> blocking::serial::write::Default<u8>
    for Channel<'_, '_, R, N>
{
}

impl<R: UartRegisters, N: RxCapacity> core::fmt::Write for Channel<'_, '_, R, N> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            self.port
                .transmit(u16::from(byte), self.timeout)
                .map_err(|_| core::fmt::Error)?;
        }
        Ok(())
    }
}

/// Receive interrupt service of one UART
///
/// Owns the receive side of the hardware and the writing end of the ring
/// buffer whose reading end sits in the matching [`UartPort`].
pub struct RxInterrupt<'a, U, N: RxCapacity> {
    receiver: U,
    rx: Producer<'a, N>,
    overruns: u32,
}

impl<'a, U: UartReceiver, N: RxCapacity> RxInterrupt<'a, U, N> {
    /// Pair the receive registers with the producer of the UART's buffer.
    pub fn new(receiver: U, rx: Producer<'a, N>) -> Self {
        Self {
            receiver,
            rx,
            overruns: 0,
        }
    }

    /// Drains the receive register into the ring buffer and acknowledges the
    /// interrupt. Call from the handler of the receive interrupt.
    ///
    /// Bytes that find the buffer full are dropped and counted as overruns.
    /// Of 9-bit words only the low eight bits are kept. Returns the number
    /// of bytes stored.
    pub fn on_interrupt(&mut self) -> usize {
        let mut stored = 0;
        while self.receiver.data_available() {
            let byte = self.receiver.receive() as u8;
            if self.rx.push(byte).is_ok() {
                stored += 1;
            } else {
                self.overruns = self.overruns.saturating_add(1);
                trace!("receive buffer full, dropped {=u8:#x}", byte);
            }
        }
        self.receiver.clear_receive_flag();
        stored
    }

    /// Number of bytes dropped because the buffer was full
    ///
    /// The count accumulates over the lifetime of the service, across
    /// releases and allocations of the UART, until read out with
    /// [`Self::take_overruns`].
    pub fn overruns(&self) -> u32 {
        self.overruns
    }

    /// Returns the overrun count and starts counting from zero again.
    pub fn take_overruns(&mut self) -> u32 {
        core::mem::take(&mut self.overruns)
    }

    /// Split into the receive registers and the buffer producer.
    pub fn free(self) -> (U, Producer<'a, N>) {
        (self.receiver, self.rx)
    }
}
