//! Receive ring buffer between the UART interrupt and the foreground
//!
//! A [`RxBuffer`] is a single-producer single-consumer byte queue. It is
//! [`split`](RxBuffer::split) into a [`Producer`], handed to the receive
//! interrupt, and a [`Consumer`], owned by the UART table. Neither half
//! takes a lock; the two index words are atomics and each is written by one
//! side only.

use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicUsize, Ordering};
use generic_array::{typenum::NonZero, ArrayLength, GenericArray};
use vcell::VolatileCell;

/// Capacity of a [`RxBuffer`], a nonzero `typenum` length
pub trait RxCapacity: ArrayLength<VolatileCell<u8>> + NonZero {}
impl<N> RxCapacity for N where N: ArrayLength<VolatileCell<u8>> + NonZero {}

/// Storage of a receive ring buffer
///
/// All initialization happens in [`RxBuffer::split`], so this type can be
/// placed in a `static` or in a link section that is not initialized by the
/// system.
pub struct RxBuffer<N: RxCapacity> {
    /// Next slot written by the producer, modulo `2 * N`
    head: AtomicUsize,
    /// Next slot read by the consumer, modulo `2 * N`
    tail: AtomicUsize,
    storage: MaybeUninit<GenericArray<VolatileCell<u8>, N>>,
}

impl<N: RxCapacity> RxBuffer<N> {
    /// Create the uninitialized storage.
    pub const fn new() -> Self {
        Self {
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            storage: MaybeUninit::uninit(),
        }
    }

    /// Empty the buffer and hand out its two ends.
    pub fn split(&mut self) -> (Producer<'_, N>, Consumer<'_, N>) {
        let Self {
            head,
            tail,
            storage,
        } = self;
        *head.get_mut() = 0;
        *tail.get_mut() = 0;
        *storage = MaybeUninit::zeroed();
        // Safety: All bits 0 is a valid value for an array of bytes.
        let storage = unsafe { storage.assume_init_mut() };
        let ring = Ring {
            head,
            tail,
            storage,
        };
        (Producer { ring }, Consumer { ring })
    }
}

impl<N: RxCapacity> Default for RxBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

struct Ring<'a, N: RxCapacity> {
    head: &'a AtomicUsize,
    tail: &'a AtomicUsize,
    storage: &'a GenericArray<VolatileCell<u8>, N>,
}

impl<N: RxCapacity> Clone for Ring<'_, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N: RxCapacity> Copy for Ring<'_, N> {}

impl<N: RxCapacity> Ring<'_, N> {
    const CAPACITY: usize = N::USIZE;

    fn advance(index: usize) -> usize {
        (index + 1) % (2 * Self::CAPACITY)
    }

    fn distance(head: usize, tail: usize) -> usize {
        (head + 2 * Self::CAPACITY - tail) % (2 * Self::CAPACITY)
    }

    fn len(&self) -> usize {
        Self::distance(
            self.head.load(Ordering::Acquire),
            self.tail.load(Ordering::Acquire),
        )
    }
}

/// Writing end of a [`RxBuffer`], used from the receive interrupt
pub struct Producer<'a, N: RxCapacity> {
    ring: Ring<'a, N>,
}

/// Reading end of a [`RxBuffer`]
pub struct Consumer<'a, N: RxCapacity> {
    ring: Ring<'a, N>,
}

// Safety: The producer only writes the slot at `head` and publishes it with a
// release store of `head`. The consumer only reads slots between `tail` and
// an acquired `head`, and only moves `tail`. No slot is accessed by both ends
// at once, so either end can live in another execution context.
unsafe impl<N: RxCapacity> Send for Producer<'_, N> {}
unsafe impl<N: RxCapacity> Send for Consumer<'_, N> {}

impl<N: RxCapacity> Producer<'_, N> {
    /// Append a byte. Gives the byte back if the buffer is full.
    pub fn push(&mut self, byte: u8) -> Result<(), u8> {
        let head = self.ring.head.load(Ordering::Relaxed);
        let tail = self.ring.tail.load(Ordering::Acquire);
        if Ring::<N>::distance(head, tail) == Ring::<N>::CAPACITY {
            return Err(byte);
        }
        self.ring.storage[head % Ring::<N>::CAPACITY].set(byte);
        self.ring.head.store(Ring::<N>::advance(head), Ordering::Release);
        Ok(())
    }

    /// Returns `true` if a further push would be rejected.
    pub fn is_full(&self) -> bool {
        self.ring.len() == Ring::<N>::CAPACITY
    }
}

impl<N: RxCapacity> Consumer<'_, N> {
    /// Take the oldest byte.
    pub fn pop(&mut self) -> Option<u8> {
        let tail = self.ring.tail.load(Ordering::Relaxed);
        let head = self.ring.head.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let byte = self.ring.storage[tail % Ring::<N>::CAPACITY].get();
        self.ring.tail.store(Ring::<N>::advance(tail), Ordering::Release);
        Some(byte)
    }

    /// Move buffered bytes into `buf`, oldest first. Returns the number of
    /// bytes written.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut count = 0;
        for slot in buf.iter_mut() {
            match self.pop() {
                Some(byte) => *slot = byte,
                None => break,
            }
            count += 1;
        }
        count
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` if no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bytes the buffer holds when full
    pub fn capacity(&self) -> usize {
        Ring::<N>::CAPACITY
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        let head = self.ring.head.load(Ordering::Acquire);
        self.ring.tail.store(head, Ordering::Release);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use generic_array::typenum::{U1, U4};

    #[test]
    fn bytes_come_out_in_order() {
        let mut buffer = RxBuffer::<U4>::new();
        let (mut producer, mut consumer) = buffer.split();
        assert!(consumer.is_empty());
        for byte in [1, 2, 3] {
            producer.push(byte).unwrap();
        }
        assert_eq!(consumer.len(), 3);
        assert_eq!(consumer.pop(), Some(1));
        assert_eq!(consumer.pop(), Some(2));
        assert_eq!(consumer.pop(), Some(3));
        assert_eq!(consumer.pop(), None);
    }

    #[test]
    fn order_survives_wrap_around() {
        let mut buffer = RxBuffer::<U4>::new();
        let (mut producer, mut consumer) = buffer.split();
        let mut out = [0; 4];
        for round in 0u8..10 {
            let base = round * 3;
            for byte in base..base + 3 {
                producer.push(byte).unwrap();
            }
            assert_eq!(consumer.read(&mut out), 3);
            assert_eq!(&out[..3], &[base, base + 1, base + 2]);
        }
        assert!(consumer.is_empty());
    }

    #[test]
    fn full_buffer_rejects_pushes() {
        let mut buffer = RxBuffer::<U4>::new();
        let (mut producer, mut consumer) = buffer.split();
        for byte in 0..4 {
            producer.push(byte).unwrap();
        }
        assert!(producer.is_full());
        assert_eq!(producer.push(4), Err(4));
        assert_eq!(consumer.len(), consumer.capacity());

        assert_eq!(consumer.pop(), Some(0));
        assert_eq!(producer.push(5), Ok(()));
        let mut out = [0; 8];
        assert_eq!(consumer.read(&mut out), 4);
        assert_eq!(&out[..4], &[1, 2, 3, 5]);
    }

    #[test]
    fn single_slot_buffer() {
        let mut buffer = RxBuffer::<U1>::new();
        let (mut producer, mut consumer) = buffer.split();
        for byte in 0..5 {
            assert_eq!(producer.push(byte), Ok(()));
            assert_eq!(producer.push(0xff), Err(0xff));
            assert_eq!(consumer.pop(), Some(byte));
        }
    }

    #[test]
    fn clear_discards_buffered_bytes() {
        let mut buffer = RxBuffer::<U4>::new();
        let (mut producer, mut consumer) = buffer.split();
        producer.push(7).unwrap();
        producer.push(8).unwrap();
        consumer.clear();
        assert!(consumer.is_empty());
        producer.push(9).unwrap();
        assert_eq!(consumer.pop(), Some(9));
    }

    #[test]
    fn split_resets_a_used_buffer() {
        let mut buffer = RxBuffer::<U4>::new();
        {
            let (mut producer, _consumer) = buffer.split();
            producer.push(1).unwrap();
        }
        let (_producer, mut consumer) = buffer.split();
        assert_eq!(consumer.pop(), None);
    }
}
