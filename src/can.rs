//! CAN controller lifecycle
//!
//! [`Cans`] owns the register ports of all CAN controllers of the chip and
//! hands out [`DeviceHandle`]s for them. A controller goes through
//! allocation, enabling (which leaves it in configuration mode), bit timing
//! setup and finally a [`CanMode`] change into an operational mode.

use crate::config::{Config, Timeout};
use crate::device::{DeviceClass, DeviceHandle, DeviceTable, Error, Instance, InstanceCount};
use crate::reg::{CanBitConfig, CanControl};
use crate::timing::{self, BitTiming};
use crate::wait::{poll_until, WaitCondition};
use fugit::HertzU32;
use rtperiph_core::{CanRegisters, ClockBus, ClockSource};

/// Largest number of CAN controllers the supported parts carry
pub const MAX_INSTANCES: usize = 4;

/// Operating modes of a CAN controller
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanMode {
    /// Take part in bus traffic
    Normal,
    /// Module is switched off from the bus
    #[default]
    Disabled,
    /// Transmitted messages are looped back internally
    Loopback,
    /// Receive valid messages without acknowledging them
    ListenOnly,
    /// Bit timing and filters can be changed
    Configuration,
    /// Receive all messages, including erroneous ones
    ListenAll,
}

impl CanMode {
    /// Value of the 3-bit request / acknowledge fields
    pub const fn opcode(self) -> u8 {
        match self {
            Self::Normal => 0b000,
            Self::Disabled => 0b001,
            Self::Loopback => 0b010,
            Self::ListenOnly => 0b011,
            Self::Configuration => 0b100,
            Self::ListenAll => 0b111,
        }
    }
}

impl TryFrom<u8> for CanMode {
    type Error = Error;

    fn try_from(opcode: u8) -> Result<Self, Self::Error> {
        match opcode {
            0b000 => Ok(Self::Normal),
            0b001 => Ok(Self::Disabled),
            0b010 => Ok(Self::Loopback),
            0b011 => Ok(Self::ListenOnly),
            0b100 => Ok(Self::Configuration),
            0b111 => Ok(Self::ListenAll),
            _ => Err(Error::InvalidMode(opcode)),
        }
    }
}

const UNCONFIGURED: BitTiming = BitTiming::new(HertzU32::from_raw(0), 0, 0, 0);

struct Controller<R> {
    regs: R,
    mode: CanMode,
    timing: BitTiming,
}

impl<R> Instance for Controller<R> {
    const CLASS: DeviceClass = DeviceClass::Can;

    fn reset(&mut self) {
        self.mode = CanMode::Disabled;
        self.timing = UNCONFIGURED;
    }
}

impl<R: CanRegisters> Controller<R> {
    /// Requests `mode` and waits for the controller to report it.
    fn request_mode(&mut self, mode: CanMode, timeout: Timeout) -> Result<(), Error> {
        let mut con = CanControl::from_bits(self.regs.control());
        con.set_on(true);
        con.set_reqop(mode.opcode());
        self.regs.set_control(con.bits());
        trace!("requested CAN mode {}", mode);
        let regs = &self.regs;
        poll_until(timeout, WaitCondition::ModeChange(mode), || {
            CanControl::from_bits(regs.control()).opmod() == mode.opcode()
        })
    }

    /// Switches the module off and waits for ongoing bus activity to end.
    fn power_down(&mut self, timeout: Timeout) -> Result<(), Error> {
        let mut con = CanControl::from_bits(self.regs.control());
        con.set_on(false);
        self.regs.set_control(con.bits());
        let regs = &self.regs;
        poll_until(timeout, WaitCondition::BusIdle, || {
            !CanControl::from_bits(regs.control()).busy()
        })
    }

    fn write_bit_config(&mut self, timing: &BitTiming, prescaler: u8) {
        let mut cfg = CanBitConfig::from_bits(self.regs.bit_config());
        cfg.set_brp(prescaler - 1);
        // 1 Tq
        cfg.set_sjw(0);
        cfg.set_prseg(timing.propagation_seg - 1);
        cfg.set_seg1ph(timing.phase_seg_1 - 1);
        cfg.set_seg2phts(true);
        cfg.set_seg2ph(timing.phase_seg_2 - 1);
        self.regs.set_bit_config(cfg.bits());
    }
}

/// Table of the CAN controllers of a chip
///
/// `N` is the number of controllers present, at most [`MAX_INSTANCES`].
/// `K` provides the frequency of the [`ClockBus::Can`] clock.
pub struct Cans<R, K, const N: usize> {
    table: DeviceTable<Controller<R>, N>,
    clocks: K,
    config: Config,
}

impl<R: CanRegisters, K: ClockSource, const N: usize> Cans<R, K, N> {
    /// Take ownership of the register ports, in minor number order.
    ///
    /// No register is touched; all controllers start out unallocated.
    pub fn new(registers: [R; N], clocks: K, config: Config) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = InstanceCount::<N, MAX_INSTANCES>::CHECK;
        Self {
            table: DeviceTable::new(registers.map(|regs| Controller {
                regs,
                mode: CanMode::Disabled,
                timing: UNCONFIGURED,
            })),
            clocks,
            config,
        }
    }

    /// Claims the first free controller. Returns `None` if all are in use.
    pub fn allocate(&mut self) -> Option<DeviceHandle> {
        self.table.allocate()
    }

    /// Claims the controller named by `handle`.
    pub fn open(&mut self, handle: DeviceHandle) -> Result<(), Error> {
        self.table.open(handle)
    }

    /// Gives a controller back, disabling it first if needed.
    ///
    /// A controller is disabled if it is enabled or its module reads as
    /// switched on. Releasing a handle that names no controller, or a
    /// controller that is not allocated, does nothing. If disabling fails the
    /// controller stays allocated.
    pub fn release(&mut self, handle: DeviceHandle) -> Result<(), Error> {
        let Ok(index) = self.table.index(handle) else {
            return Ok(());
        };
        let slot = self.table.slot(index);
        if !slot.is_used() {
            return Ok(());
        }
        let on = CanControl::from_bits(slot.instance.regs.control()).on();
        if slot.is_enabled() || on {
            self.disable(handle)?;
        }
        self.table.free(index);
        debug!("released {}", handle);
        Ok(())
    }

    /// Returns `true` if `handle` names an allocated controller.
    pub fn is_allocated(&self, handle: DeviceHandle) -> bool {
        self.table.allocated(handle).is_ok()
    }

    /// Returns `true` if `handle` names an enabled controller.
    pub fn is_enabled(&self, handle: DeviceHandle) -> bool {
        self.table
            .allocated(handle)
            .map(|slot| slot.is_enabled())
            .unwrap_or(false)
    }

    /// Switches the controller on and brings it into configuration mode.
    pub fn enable(&mut self, handle: DeviceHandle) -> Result<(), Error> {
        let timeout = self.config.timeout;
        let slot = self.table.allocated_mut(handle)?;
        slot.set_enabled(true);
        slot.instance.request_mode(CanMode::Configuration, timeout)?;
        debug!("enabled {}", handle);
        Ok(())
    }

    /// Masks the controller's interrupt, takes it off the bus and switches it
    /// off.
    ///
    /// The controller counts as enabled until it has reached disabled mode
    /// and the bus is idle, so a failed attempt can be repeated, also through
    /// [`Self::release`].
    pub fn disable(&mut self, handle: DeviceHandle) -> Result<(), Error> {
        let timeout = self.config.timeout;
        let slot = self.table.allocated_mut(handle)?;
        slot.instance.regs.set_interrupt_enabled(false);
        slot.instance.request_mode(CanMode::Disabled, timeout)?;
        slot.instance.power_down(timeout)?;
        slot.set_enabled(false);
        debug!("disabled {}", handle);
        Ok(())
    }

    /// Changes the operating mode and waits for the acknowledgement.
    ///
    /// Switches the module on if it is not yet, which enables the controller
    /// as far as [`Self::is_enabled`] and [`Self::release`] are concerned.
    pub fn set_mode(&mut self, handle: DeviceHandle, mode: CanMode) -> Result<(), Error> {
        let timeout = self.config.timeout;
        let slot = self.table.allocated_mut(handle)?;
        slot.set_enabled(true);
        slot.instance.mode = mode;
        slot.instance.request_mode(mode, timeout)
    }

    /// Last mode set with [`Self::set_mode`]
    pub fn mode(&self, handle: DeviceHandle) -> Result<CanMode, Error> {
        Ok(self.table.allocated(handle)?.instance.mode)
    }

    /// Programs the bit timing.
    ///
    /// The controller is switched on and put into configuration mode, where
    /// it stays; use [`Self::set_mode`] afterwards to go back on the bus.
    pub fn set_bit_timing(&mut self, handle: DeviceHandle, timing: BitTiming) -> Result<(), Error> {
        let timeout = self.config.timeout;
        let clock = self.clocks.frequency(ClockBus::Can);
        let slot = self.table.allocated_mut(handle)?;
        let prescaler = timing.prescaler(clock)?;
        debug!(
            "{}: {} quanta per bit, prescaler {}",
            handle,
            timing.time_quanta_per_bit(),
            prescaler
        );
        slot.set_enabled(true);
        slot.instance.request_mode(CanMode::Configuration, timeout)?;
        slot.instance.write_bit_config(&timing, prescaler);
        slot.instance.timing = timing;
        Ok(())
    }

    /// Bit timing as last passed to [`Self::set_bit_timing`]
    ///
    /// An unconfigured controller reports a zero bit rate and zero-length
    /// segments.
    pub fn bit_timing(&self, handle: DeviceHandle) -> Result<BitTiming, Error> {
        Ok(self.table.allocated(handle)?.instance.timing)
    }

    /// Bit rate the controller actually runs at, computed from the programmed
    /// prescaler and segments. Zero while no bit timing has been set.
    pub fn effective_bit_rate(&self, handle: DeviceHandle) -> Result<HertzU32, Error> {
        let instance = &self.table.allocated(handle)?.instance;
        if instance.timing == UNCONFIGURED {
            return Ok(HertzU32::from_raw(0));
        }
        let cfg = CanBitConfig::from_bits(instance.regs.bit_config());
        let quanta = 4 + u32::from(cfg.prseg()) + u32::from(cfg.seg1ph()) + u32::from(cfg.seg2ph());
        Ok(timing::effective_bit_rate(
            self.clocks.frequency(ClockBus::Can),
            u32::from(cfg.brp()) + 1,
            quanta,
        ))
    }

    /// Raw access to the registers of a controller.
    ///
    /// # Safety
    /// The abstraction assumes that it has exclusive ownership of the
    /// registers. Direct access can break such assumptions.
    pub unsafe fn registers(&self, handle: DeviceHandle) -> Result<&R, Error> {
        Ok(&self.table.lookup(handle)?.instance.regs)
    }

    /// Gives the register ports back, in minor number order.
    pub fn free(self) -> [R; N] {
        self.table.into_instances().map(|controller| controller.regs)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn opcodes_convert_back() {
        for mode in [
            CanMode::Normal,
            CanMode::Disabled,
            CanMode::Loopback,
            CanMode::ListenOnly,
            CanMode::Configuration,
            CanMode::ListenAll,
        ] {
            assert_eq!(CanMode::try_from(mode.opcode()), Ok(mode));
        }
    }

    #[test]
    fn reserved_opcodes_are_rejected() {
        for opcode in [0b101, 0b110, 8, 0xff] {
            assert_eq!(CanMode::try_from(opcode), Err(Error::InvalidMode(opcode)));
        }
    }
}
