pub use crate::core::CanRegisters as _;
pub use crate::core::ClockSource as _;
pub use crate::core::UartReceiver as _;
pub use crate::core::UartRegisters as _;

pub use embedded_hal::blocking::serial::Write as _;
pub use embedded_hal::serial::Read as _;
pub use embedded_hal::serial::Write as _;
pub use fugit::RateExtU32 as _;
