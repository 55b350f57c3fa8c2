//! Simulated register blocks for driving the drivers without hardware
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use rtperiph::core::fugit::HertzU32;
use rtperiph::core::{
    CanRegisters, ClockBus, ClockSource, UartInterrupt, UartReceiver, UartRegisters,
};
use rtperiph::reg::{CanControl, UartMode, UartStatus};

/// Same frequency on every bus
pub struct FixedClock(pub HertzU32);

impl ClockSource for FixedClock {
    fn frequency(&self, _: ClockBus) -> HertzU32 {
        self.0
    }
}

const OPMOD_SHIFT: u32 = 21;
const OPMOD_MASK: u32 = 0b111 << OPMOD_SHIFT;
const BUSY: u32 = 1 << 11;

/// CAN controller acknowledging mode requests right away
///
/// `OPMOD` follows `REQOP` on every control write unless the controller is
/// stuck, and the busy flag follows `ON` unless the bus never goes idle.
pub struct FakeCan {
    control: u32,
    pub bit_config: u32,
    pub interrupt_enabled: bool,
    stuck: bool,
    never_idle: bool,
    /// `ON` and `REQOP` of every control write, in order
    pub writes: Vec<(bool, u8)>,
}

impl FakeCan {
    pub fn new() -> Self {
        Self {
            // Reset value: configuration mode
            control: 0b100 << OPMOD_SHIFT,
            bit_config: 0,
            interrupt_enabled: true,
            stuck: false,
            never_idle: false,
            writes: Vec::new(),
        }
    }

    /// Never leaves disabled mode
    pub fn stuck() -> Self {
        Self {
            control: 0b001 << OPMOD_SHIFT,
            stuck: true,
            ..Self::new()
        }
    }

    /// Left switched on in normal mode by whoever ran before
    pub fn running() -> Self {
        Self {
            control: (1 << 15) | BUSY,
            ..Self::new()
        }
    }

    /// Keeps reporting bus activity after being switched off
    pub fn never_idle() -> Self {
        Self {
            never_idle: true,
            ..Self::new()
        }
    }

    pub fn control_word(&self) -> CanControl {
        CanControl::from_bits(self.control)
    }
}

unsafe impl CanRegisters for FakeCan {
    fn control(&self) -> u32 {
        self.control
    }

    fn set_control(&mut self, bits: u32) {
        let written = CanControl::from_bits(bits);
        let mut control = bits & !(OPMOD_MASK | BUSY);
        control |= if self.stuck {
            self.control & OPMOD_MASK
        } else {
            u32::from(written.reqop()) << OPMOD_SHIFT
        };
        if written.on() || self.never_idle {
            control |= BUSY;
        }
        self.writes.push((written.on(), written.reqop()));
        self.control = control;
    }

    fn bit_config(&self) -> u32 {
        self.bit_config
    }

    fn set_bit_config(&mut self, bits: u32) {
        self.bit_config = bits;
    }

    fn set_interrupt_enabled(&mut self, enabled: bool) {
        self.interrupt_enabled = enabled;
    }
}

/// Calls a [`FakeUart`] received, in order
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UartEvent {
    ClearFlag(UartInterrupt),
    Priority(UartInterrupt, u8),
    Enable(UartInterrupt, bool),
}

/// UART with a transmitter that is either always ready or never ready
pub struct FakeUart {
    pub mode: u32,
    utxen: bool,
    pub brg: u16,
    /// Transmit buffer permanently full
    pub tx_full: Cell<bool>,
    /// Transmit shift register never drains
    pub tx_busy: Cell<bool>,
    /// Words accepted before the transmit buffer fills up, unlimited if
    /// `None`
    pub tx_space: Cell<Option<usize>>,
    pub transmitted: Vec<u16>,
    pub events: Vec<UartEvent>,
}

impl FakeUart {
    pub fn new() -> Self {
        Self {
            mode: 0,
            utxen: false,
            brg: 0,
            tx_full: Cell::new(false),
            tx_busy: Cell::new(false),
            tx_space: Cell::new(None),
            transmitted: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn mode_word(&self) -> UartMode {
        UartMode::from_bits(self.mode)
    }

    pub fn status_word(&self) -> UartStatus {
        UartStatus::from_bits(self.status())
    }

    pub fn interrupt_enabled(&self, interrupt: UartInterrupt) -> bool {
        self.events
            .iter()
            .rev()
            .find_map(|event| match *event {
                UartEvent::Enable(i, enabled) if i == interrupt => Some(enabled),
                _ => None,
            })
            .unwrap_or(false)
    }
}

unsafe impl UartRegisters for FakeUart {
    fn mode(&self) -> u32 {
        self.mode
    }

    fn set_mode(&mut self, bits: u32) {
        self.mode = bits;
    }

    fn status(&self) -> u32 {
        let mut bits = 0;
        if !self.tx_busy.get() {
            bits |= 1 << 8;
        }
        if self.tx_full.get() || self.tx_space.get() == Some(0) {
            bits |= 1 << 9;
        }
        if self.utxen {
            bits |= 1 << 10;
        }
        bits
    }

    fn set_status(&mut self, bits: u32) {
        self.utxen = UartStatus::from_bits(bits).utxen();
    }

    fn baud_divisor(&self) -> u16 {
        self.brg
    }

    fn set_baud_divisor(&mut self, brg: u16) {
        self.brg = brg;
    }

    fn transmit(&mut self, word: u16) {
        if let Some(space) = self.tx_space.get() {
            self.tx_space.set(Some(space.saturating_sub(1)));
        }
        self.transmitted.push(word);
    }

    fn set_interrupt_priority(&mut self, interrupt: UartInterrupt, priority: u8) {
        self.events.push(UartEvent::Priority(interrupt, priority));
    }

    fn clear_interrupt_flag(&mut self, interrupt: UartInterrupt) {
        self.events.push(UartEvent::ClearFlag(interrupt));
    }

    fn set_interrupt_enabled(&mut self, interrupt: UartInterrupt, enabled: bool) {
        self.events.push(UartEvent::Enable(interrupt, enabled));
    }
}

/// Receive side of a UART, fed through the shared [`Line`]
pub struct FakeReceiver {
    line: Line,
}

/// Words waiting in a [`FakeReceiver`] and the number of flag clears
#[derive(Clone, Default)]
pub struct Line(Rc<RefCell<(VecDeque<u16>, usize)>>);

impl Line {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receiver(&self) -> FakeReceiver {
        FakeReceiver { line: self.clone() }
    }

    pub fn send(&self, bytes: &[u8]) {
        self.0
            .borrow_mut()
            .0
            .extend(bytes.iter().map(|&b| u16::from(b)));
    }

    pub fn send_word(&self, word: u16) {
        self.0.borrow_mut().0.push_back(word);
    }

    pub fn pending(&self) -> usize {
        self.0.borrow().0.len()
    }

    pub fn flag_clears(&self) -> usize {
        self.0.borrow().1
    }
}

unsafe impl UartReceiver for FakeReceiver {
    fn data_available(&self) -> bool {
        !self.line.0.borrow().0.is_empty()
    }

    fn receive(&mut self) -> u16 {
        self.line.0.borrow_mut().0.pop_front().unwrap_or(0)
    }

    fn clear_receive_flag(&mut self) {
        self.line.0.borrow_mut().1 += 1;
    }
}
