//! Bit layouts of the peripheral register words
//!
//! The integration layer hands out raw register words; these types give the
//! fields names. Only the fields the drivers touch are described, all other
//! bits are carried through unchanged by read-modify-write sequences.

use bitfield::bitfield;

bitfield! {
    /// CAN module control register (`CiCON`)
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct CanControl(u32);
    impl Debug;
    /// Module is busy with bus activity
    pub busy, _: 11;
    /// Module enable
    pub on, set_on: 15;
    /// Operating mode currently in effect
    pub u8, opmod, _: 23, 21;
    /// Requested operating mode
    pub u8, reqop, set_reqop: 26, 24;
}

bitfield! {
    /// CAN bit timing configuration register (`CiCFG`)
    ///
    /// The segment and jump width fields hold their length in time quanta
    /// minus one. The baud rate prescaler field holds `BRP` with
    /// `Tq = 2 * (BRP + 1) / f_clk`.
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct CanBitConfig(u32);
    impl Debug;
    /// Baud rate prescaler
    pub u8, brp, set_brp: 5, 0;
    /// Synchronization jump width
    pub u8, sjw, set_sjw: 7, 6;
    /// Propagation time segment
    pub u8, prseg, set_prseg: 10, 8;
    /// Phase buffer segment 1
    pub u8, seg1ph, set_seg1ph: 13, 11;
    /// Sample the bus three times instead of once
    pub sam, set_sam: 14;
    /// Phase buffer segment 2 is freely programmable
    pub seg2phts, set_seg2phts: 15;
    /// Phase buffer segment 2
    pub u8, seg2ph, set_seg2ph: 18, 16;
}

bitfield! {
    /// UART mode register (`UxMODE`)
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct UartMode(u32);
    impl Debug;
    /// Two stop bits
    pub stsel, set_stsel: 0;
    /// Parity and data selection
    pub u8, pdsel, set_pdsel: 2, 1;
    /// High speed baud rate generation (divide by 4 instead of 16)
    pub brgh, set_brgh: 3;
    /// Module enable
    pub on, set_on: 15;
}

bitfield! {
    /// UART status and control register (`UxSTA`)
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct UartStatus(u32);
    impl Debug;
    /// Receive buffer has data
    pub urxda, _: 0;
    /// Transmit shift register is empty
    pub trmt, _: 8;
    /// Transmit buffer is full
    pub utxbf, _: 9;
    /// Transmitter enable
    pub utxen, set_utxen: 10;
}

macro_rules! register_word {
    ($($ty:ident),*) => {$(
        impl $ty {
            /// Wrap a raw register word.
            pub const fn from_bits(bits: u32) -> Self {
                Self(bits)
            }

            /// Raw register word
            pub const fn bits(&self) -> u32 {
                self.0
            }
        }
    )*};
}

register_word!(CanControl, CanBitConfig, UartMode, UartStatus);
