//! Device handles and per-class instance tables
//!
//! Every physical peripheral instance present on the chip owns a slot in a
//! table of its class. Applications never touch the slots directly; they hold
//! a [`DeviceHandle`] naming the class and the index of the instance (its
//! _minor number_) and pass it to every operation of the class driver.

use crate::timing::{BaudRateError, BitTimingError};
use crate::uart::FramingError;
use crate::wait::WaitCondition;
use bitfield::bitfield;

/// Peripheral classes that can be addressed through a [`DeviceHandle`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DeviceClass {
    /// Universal asynchronous receiver/transmitter
    Uart = 0x01,
    /// CAN controller
    Can = 0x02,
}

impl DeviceClass {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x01 => Some(Self::Uart),
            0x02 => Some(Self::Can),
            _ => None,
        }
    }
}

/// Opaque reference to one peripheral instance
///
/// The raw representation packs the class in the high byte and the minor
/// number in the low byte. The raw value [`DeviceHandle::NULL`] never names
/// an instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceHandle {
    class: DeviceClass,
    minor: u8,
}

impl DeviceHandle {
    /// Raw value of the null device
    pub const NULL: u16 = 0;

    /// Create a handle for instance `minor` of `class`.
    ///
    /// Whether the instance exists is only checked by the table the handle
    /// is used with.
    pub const fn new(class: DeviceClass, minor: u8) -> Self {
        Self { class, minor }
    }

    /// Peripheral class
    pub const fn class(&self) -> DeviceClass {
        self.class
    }

    /// Index of the instance within its class
    pub const fn minor(&self) -> u8 {
        self.minor
    }

    /// Packed representation
    pub const fn raw(&self) -> u16 {
        ((self.class as u16) << 8) | self.minor as u16
    }

    /// Unpack a raw handle. Returns `None` for the null device and for
    /// unknown classes.
    pub fn from_raw(raw: u16) -> Option<Self> {
        let class = DeviceClass::from_bits((raw >> 8) as u8)?;
        Some(Self::new(class, raw as u8))
    }
}

impl From<DeviceHandle> for u16 {
    fn from(handle: DeviceHandle) -> Self {
        handle.raw()
    }
}

/// Errors reported by the peripheral drivers
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The handle's class does not match the table, or its minor number is
    /// not below the number of instances
    InvalidHandle(DeviceHandle),
    /// The instance exists but has not been allocated
    NotAllocated(DeviceHandle),
    /// The instance is already allocated
    AlreadyInUse(DeviceHandle),
    /// Raw value is not a CAN operating mode opcode
    InvalidMode(u8),
    /// Problems with the CAN bit timing
    BitTiming(BitTimingError),
    /// Problems with the UART baud rate
    BaudRate(BaudRateError),
    /// Unsupported UART character framing
    Framing(FramingError),
    /// UART interrupt priorities out of range, or receive not above transmit
    InterruptPriority {
        /// Configured receive interrupt priority
        receive: u8,
        /// Configured transmit interrupt priority
        transmit: u8,
    },
    /// The hardware did not acknowledge a request in time
    Timeout(WaitCondition),
}

impl From<BitTimingError> for Error {
    fn from(value: BitTimingError) -> Self {
        Self::BitTiming(value)
    }
}

impl From<BaudRateError> for Error {
    fn from(value: BaudRateError) -> Self {
        Self::BaudRate(value)
    }
}

impl From<FramingError> for Error {
    fn from(value: FramingError) -> Self {
        Self::Framing(value)
    }
}

bitfield! {
    /// Allocation state of a slot
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    struct Status(u8);
    impl Debug;
    /// Slot is allocated
    used, set_used: 0;
    /// Hardware is currently driven
    enabled, set_enabled: 1;
}

/// Per-class behaviour of the record held in a slot
pub(crate) trait Instance {
    /// Class of the handles naming this kind of instance
    const CLASS: DeviceClass;

    /// Bring the record back to its default configuration.
    fn reset(&mut self);
}

/// One entry of a [`DeviceTable`]
pub(crate) struct Slot<T> {
    status: Status,
    pub(crate) instance: T,
}

impl<T> Slot<T> {
    pub(crate) fn is_used(&self) -> bool {
        self.status.used()
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.status.enabled()
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        debug_assert!(self.status.used() || !enabled);
        self.status.set_enabled(enabled);
    }
}

/// Checks an instance count against what the peripheral family provides.
pub(crate) struct InstanceCount<const N: usize, const MAX: usize>;

impl<const N: usize, const MAX: usize> InstanceCount<N, MAX> {
    pub(crate) const CHECK: () = assert!(
        N != 0 && N <= MAX,
        "instance count not supported by the peripheral family"
    );
}

/// Fixed-size table of the instances of one peripheral class
pub(crate) struct DeviceTable<T, const N: usize> {
    slots: [Slot<T>; N],
}

impl<T: Instance, const N: usize> DeviceTable<T, N> {
    pub(crate) fn new(instances: [T; N]) -> Self {
        let mut slots = instances.map(|instance| Slot {
            status: Status::default(),
            instance,
        });
        for slot in slots.iter_mut() {
            slot.instance.reset();
        }
        Self { slots }
    }

    /// Claims the first unused slot. Returns `None` when all instances are in
    /// use.
    pub(crate) fn allocate(&mut self) -> Option<DeviceHandle> {
        let index = self.slots.iter().position(|slot| !slot.is_used())?;
        let slot = &mut self.slots[index];
        slot.status.set_used(true);
        slot.instance.reset();
        // `N` fits the minor number, it is bounded by `InstanceCount`
        let handle = DeviceHandle::new(T::CLASS, index as u8);
        debug!("allocated {}", handle);
        Some(handle)
    }

    /// Claims the slot named by `handle`.
    pub(crate) fn open(&mut self, handle: DeviceHandle) -> Result<(), Error> {
        let index = self.index(handle)?;
        let slot = &mut self.slots[index];
        if slot.is_used() {
            return Err(Error::AlreadyInUse(handle));
        }
        slot.status.set_used(true);
        slot.instance.reset();
        debug!("opened {}", handle);
        Ok(())
    }

    /// Returns the slot to the unused state. The caller is responsible for
    /// having disabled the hardware.
    pub(crate) fn free(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        debug_assert!(!slot.is_enabled());
        slot.status = Status::default();
        slot.instance.reset();
        trace!("freed slot {}", index);
    }

    /// Maps a handle to a slot index.
    pub(crate) fn index(&self, handle: DeviceHandle) -> Result<usize, Error> {
        let index = usize::from(handle.minor());
        if handle.class() != T::CLASS || index >= N {
            return Err(Error::InvalidHandle(handle));
        }
        Ok(index)
    }

    pub(crate) fn lookup(&self, handle: DeviceHandle) -> Result<&Slot<T>, Error> {
        let index = self.index(handle)?;
        Ok(&self.slots[index])
    }

    pub(crate) fn lookup_mut(&mut self, handle: DeviceHandle) -> Result<&mut Slot<T>, Error> {
        let index = self.index(handle)?;
        Ok(&mut self.slots[index])
    }

    /// Like [`Self::lookup`], but also requires the slot to be allocated.
    pub(crate) fn allocated(&self, handle: DeviceHandle) -> Result<&Slot<T>, Error> {
        let slot = self.lookup(handle)?;
        if !slot.is_used() {
            return Err(Error::NotAllocated(handle));
        }
        Ok(slot)
    }

    pub(crate) fn allocated_mut(&mut self, handle: DeviceHandle) -> Result<&mut Slot<T>, Error> {
        let slot = self.lookup_mut(handle)?;
        if !slot.is_used() {
            return Err(Error::NotAllocated(handle));
        }
        Ok(slot)
    }

    pub(crate) fn slot(&self, index: usize) -> &Slot<T> {
        &self.slots[index]
    }

    pub(crate) fn into_instances(self) -> [T; N] {
        self.slots.map(|slot| slot.instance)
    }
}
