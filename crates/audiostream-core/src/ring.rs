//! Lock-free single-producer single-consumer ring buffer.
//!
//! Bridges the receiver's network thread (producer) and the realtime
//! playback callback (consumer). Exactly one producer thread and one
//! consumer thread may operate concurrently; `clear` is only safe while
//! neither side is active. One slot is reserved so that full and empty
//! are unambiguous: at most `capacity() - 1` elements are buffered.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct RingBuffer<T> {
    buf: Box<[UnsafeCell<T>]>,
    capacity: usize,
    read: AtomicUsize,
    write: AtomicUsize,
}

// The SPSC contract makes the UnsafeCell accesses disjoint: the producer
// only writes slots in [write, read), the consumer only reads [read, write),
// and each index is published with release ordering after the copy.
unsafe impl<T: Send> Sync for RingBuffer<T> {}
unsafe impl<T: Send> Send for RingBuffer<T> {}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a buffer with room for `capacity - 1` elements
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "ring buffer capacity must be at least 2");
        Self {
            buf: (0..capacity).map(|_| UnsafeCell::new(T::default())).collect(),
            capacity,
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
        }
    }

    /// Copy up to `free()` elements from `src` into the buffer.
    ///
    /// Returns the count actually written. Never blocks and never
    /// overwrites unread data; excess elements are the caller's problem.
    pub fn write(&self, src: &[T]) -> usize {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);
        let used = (write + self.capacity - read) % self.capacity;
        let free = self.capacity - 1 - used;
        let n = src.len().min(free);

        for (i, &value) in src[..n].iter().enumerate() {
            unsafe { *self.buf[(write + i) % self.capacity].get() = value };
        }

        self.write.store((write + n) % self.capacity, Ordering::Release);
        n
    }

    /// Copy up to `len()` elements into `dst`.
    ///
    /// Returns the count actually read. Never blocks; on underflow the
    /// caller is responsible for zero-filling the remainder of `dst`.
    pub fn read(&self, dst: &mut [T]) -> usize {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        let used = (write + self.capacity - read) % self.capacity;
        let n = dst.len().min(used);

        for (i, slot) in dst[..n].iter_mut().enumerate() {
            *slot = unsafe { *self.buf[(read + i) % self.capacity].get() };
        }

        self.read.store((read + n) % self.capacity, Ordering::Release);
        n
    }

    /// Number of elements currently buffered
    pub fn len(&self) -> usize {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        (write + self.capacity - read) % self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of elements that can be written without dropping
    pub fn free(&self) -> usize {
        self.capacity - 1 - self.len()
    }

    /// Total slot count, one of which stays reserved
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reset to empty. Not safe while a producer or consumer is active.
    pub fn clear(&self) {
        self.read.store(0, Ordering::Relaxed);
        self.write.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_preserves_order() {
        let ring = RingBuffer::<u32>::new(8);
        assert_eq!(ring.write(&[1, 2, 3]), 3);
        assert_eq!(ring.len(), 3);

        let mut out = [0u32; 3];
        assert_eq!(ring.read(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);
        assert!(ring.is_empty());
    }

    #[test]
    fn one_slot_stays_reserved() {
        let ring = RingBuffer::<u32>::new(4);
        let written = ring.write(&[1, 2, 3, 4, 5]);
        assert_eq!(written, 3, "capacity 4 holds at most 3 elements");
        assert_eq!(ring.len() + ring.free(), ring.capacity() - 1);
        assert_eq!(ring.write(&[9]), 0, "full buffer accepts nothing");
    }

    #[test]
    fn reads_and_writes_wrap_around() {
        let ring = RingBuffer::<u32>::new(5);
        let mut next = 0u32;
        let mut expected = 0u32;
        let mut out = [0u32; 3];

        // Push/pull in lockstep long enough to wrap many times.
        for _ in 0..100 {
            let chunk: Vec<u32> = (next..next + 3).collect();
            assert_eq!(ring.write(&chunk), 3);
            next += 3;

            assert_eq!(ring.read(&mut out), 3);
            for value in out {
                assert_eq!(value, expected);
                expected += 1;
            }
        }
    }

    #[test]
    fn short_read_reports_count() {
        let ring = RingBuffer::<f32>::new(16);
        ring.write(&[0.5; 4]);

        let mut out = [1.0f32; 10];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(&out[..4], &[0.5; 4]);
        // Remainder untouched: zero-filling is the caller's job.
        assert_eq!(&out[4..], &[1.0; 6]);
    }

    #[test]
    fn clear_resets_indices() {
        let ring = RingBuffer::<u32>::new(8);
        ring.write(&[1, 2, 3, 4, 5]);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.free(), 7);
    }

    #[test]
    fn invariant_holds_across_interleavings() {
        let ring = RingBuffer::<u32>::new(7);
        let mut out = [0u32; 4];
        for step in 0..50u32 {
            ring.write(&[step, step, step]);
            ring.read(&mut out[..(step as usize % 4)]);
            assert_eq!(ring.len() + ring.free(), ring.capacity() - 1);
        }
    }
}
