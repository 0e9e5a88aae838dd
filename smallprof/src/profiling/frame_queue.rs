//! Bounded single-producer/single-consumer capture queue
//!
//! Moves [`TopFrameRecord`](smallprof_common::TopFrameRecord)s out of the
//! interrupt handler of one thread and into that same thread's checkpoint
//! handler. The producer side never blocks, never allocates and never takes a
//! lock, so `push` is safe to call from a restricted interrupt context.
//!
//! ## Index Protocol
//!
//! ```text
//!   tail (consumer-owned)        head (producer-owned)
//!     │                             │
//!     ▼                             ▼
//! ┌───┬───┬───┬───┬───┬───┬───┬───┐
//! │   │ A │ B │ C │ D │   │   │   │   slot = index % capacity
//! └───┴───┴───┴───┴───┴───┴───┴───┘
//! ```
//!
//! Indices grow monotonically (wrapping) and are only reduced modulo the
//! capacity when addressing a slot. `head - tail == capacity` means full.
//! The producer publishes a slot with a release store of `head`; the consumer
//! frees a slot with a release store of `tail`.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Fixed-capacity lock-free ring buffer
///
/// Exactly one producer and one consumer may use a queue concurrently.
/// Overflow is counted in [`lost`](FrameQueue::lost) instead of failing loudly.
pub struct FrameQueue<T: Copy> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Next slot to write
    head: AtomicUsize,
    /// Next slot to read
    tail: AtomicUsize,
    /// Pushes rejected because the queue was full
    lost: AtomicU64,
}

// SAFETY: a slot is written only by the producer while it is outside the
// published range [tail, head), and read only by the consumer while inside it.
// The acquire/release pairs on head and tail order those accesses, so a slot
// is never accessed by both sides at once. T: Copy means no drop glue.
#[allow(unsafe_code)]
unsafe impl<T: Copy + Send> Send for FrameQueue<T> {}
#[allow(unsafe_code)]
unsafe impl<T: Copy + Send> Sync for FrameQueue<T> {}

impl<T: Copy> FrameQueue<T> {
    /// Create a queue holding at most `capacity` records
    ///
    /// All slots are allocated here; nothing is allocated afterwards.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "FrameQueue capacity must be non-zero");
        let slots = (0..capacity).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect();
        Self { slots, head: AtomicUsize::new(0), tail: AtomicUsize::new(0), lost: AtomicU64::new(0) }
    }

    /// Maximum number of records the queue can hold
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Enqueue a record, returning false if the queue is full
    ///
    /// Producer side. Interrupt-safe: no allocation, no blocking, no retry.
    pub fn push(&self, record: T) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head.wrapping_sub(tail) == self.slots.len() {
            self.lost.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let slot = &self.slots[head % self.slots.len()];
        // SAFETY: slot `head` is outside [tail, head) so the consumer is not
        // reading it, and only this producer writes slots.
        #[allow(unsafe_code)]
        unsafe {
            (*slot.get()).write(record);
        }
        self.head.store(head.wrapping_add(1), Ordering::Release);
        true
    }

    /// Dequeue the oldest record, if any
    ///
    /// Consumer side. Non-blocking.
    pub fn pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if head == tail {
            return None;
        }

        let slot = &self.slots[tail % self.slots.len()];
        // SAFETY: slot `tail` is inside [tail, head); the acquire load of head
        // synchronizes with the producer's release store after the write.
        #[allow(unsafe_code)]
        let record = unsafe { (*slot.get()).assume_init_read() };
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(record)
    }

    /// Number of records currently queued
    #[must_use]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard every pending record and reset the lost counter
    ///
    /// Consumer side: only moves `tail`, so a concurrent `push` stays safe.
    /// Returns the number of records discarded.
    pub fn clear(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        self.tail.store(head, Ordering::Release);
        self.lost.store(0, Ordering::Relaxed);
        head.wrapping_sub(tail)
    }

    /// Records rejected since creation or the last `clear`/`take_lost`
    #[must_use]
    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Read and reset the lost counter
    pub fn take_lost(&self) -> u64 {
        self.lost.swap(0, Ordering::Relaxed)
    }
}

impl<T: Copy> std::fmt::Debug for FrameQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("lost", &self.lost())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallprof_common::{Frame, MethodId, ThreadTag, TopFrameRecord};
    use std::sync::Arc;

    fn record(n: u64) -> TopFrameRecord {
        TopFrameRecord { thread: ThreadTag(1), top: Frame::new(MethodId(n), 0) }
    }

    #[test]
    fn test_fifo_order() {
        let queue = FrameQueue::new(4);
        for n in 1..=4 {
            assert!(queue.push(record(n)));
        }
        for n in 1..=4 {
            assert_eq!(queue.pop(), Some(record(n)));
        }
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_push_fails_exactly_when_full() {
        let queue = FrameQueue::new(2);
        assert!(queue.push(record(1)));
        assert!(queue.push(record(2)));
        assert!(!queue.push(record(3)));
        assert_eq!(queue.lost(), 1);
        assert_eq!(queue.len(), 2);

        // One pop frees exactly one slot
        assert_eq!(queue.pop(), Some(record(1)));
        assert!(queue.push(record(4)));
        assert!(!queue.push(record(5)));
        assert_eq!(queue.lost(), 2);
    }

    #[test]
    fn test_interleaved_push_pop_wraps_around() {
        let queue = FrameQueue::new(3);
        let mut expected = std::collections::VecDeque::new();
        let mut next = 1;

        // Deterministic interleaving that laps the buffer several times
        for round in 0..20 {
            let pushes = round % 3 + 1;
            for _ in 0..pushes {
                let accepted = queue.push(record(next));
                assert_eq!(accepted, expected.len() < 3, "push must fail only when full");
                if accepted {
                    expected.push_back(record(next));
                }
                next += 1;
            }
            let pops = (round + 1) % 3 + 1;
            for _ in 0..pops {
                assert_eq!(queue.pop(), expected.pop_front());
            }
        }
    }

    #[test]
    fn test_clear_discards_pending_and_resets_lost() {
        let queue = FrameQueue::new(2);
        queue.push(record(1));
        queue.push(record(2));
        queue.push(record(3));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.lost(), 0);
        assert!(queue.push(record(4)));
        assert_eq!(queue.pop(), Some(record(4)));
    }

    #[test]
    fn test_take_lost_resets() {
        let queue = FrameQueue::new(1);
        queue.push(record(1));
        queue.push(record(2));
        queue.push(record(3));
        assert_eq!(queue.take_lost(), 2);
        assert_eq!(queue.lost(), 0);
    }

    #[test]
    fn test_spsc_threads_preserve_order() {
        const COUNT: u64 = 50_000;
        let queue = Arc::new(FrameQueue::new(64));

        let producer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                for n in 1..=COUNT {
                    while !queue.push(record(n)) {
                        std::thread::yield_now();
                    }
                }
            })
        };

        let mut expected = 1;
        while expected <= COUNT {
            if let Some(r) = queue.pop() {
                assert_eq!(r.top.method, MethodId(expected));
                expected += 1;
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn test_zero_capacity_panics() {
        let _ = FrameQueue::<TopFrameRecord>::new(0);
    }
}
