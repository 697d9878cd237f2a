use std::mem::size_of;
use std::ptr::{self, NonNull};
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::Arc;

use super::layout::{align_up, checked_align_up, QueueHeader, QUEUE_ALIGN};
use super::Queue::SpscQueue;
use crate::Bus::Structs::Message;
use crate::Core::arena::Arena;

impl SpscQueue {
    /// Create a queue view over memory carved out of `arena`.
    ///
    /// # Safety
    /// `header` must point to an initialized [`QueueHeader`] and `slots` to
    /// `capacity` message slots, both inside `arena` and used by no other queue.
    pub(crate) unsafe fn from_raw(
        header: NonNull<QueueHeader>,
        slots: NonNull<Message>,
        arena: Arc<Arena>,
    ) -> Self {
        let capacity = header.as_ref().capacity as usize;
        Self {
            header,
            slots,
            capacity,
            mask: capacity - 1,
            _arena: arena,
        }
    }

    /// Size in bytes of one slot stride in memory.
    #[inline]
    pub const fn slot_stride() -> usize {
        size_of::<Message>()
    }

    /// Arena bytes needed for the header plus `capacity` slots, or `None`
    /// when that does not fit in a `usize`.
    pub const fn footprint(capacity: usize) -> Option<usize> {
        let header = align_up(size_of::<QueueHeader>(), QUEUE_ALIGN);
        let slots = match capacity.checked_mul(Self::slot_stride()) {
            Some(bytes) => bytes,
            None => return None,
        };
        let slots = match checked_align_up(slots, QUEUE_ALIGN) {
            Some(bytes) => bytes,
            None => return None,
        };
        header.checked_add(slots)
    }

    #[inline]
    fn header(&self) -> &QueueHeader {
        // Safety: the header lives in the arena, which this view keeps alive.
        unsafe { self.header.as_ref() }
    }

    #[inline]
    unsafe fn slot(&self, index: u64) -> *mut Message {
        self.slots.as_ptr().add(index as usize & self.mask)
    }

    /// Enqueue a copy of `msg`. Returns false, leaving the queue untouched,
    /// when it already holds `capacity` messages.
    ///
    /// # Safety
    /// At most one thread may push at a time.
    #[inline]
    pub unsafe fn push(&self, msg: &Message) -> bool {
        let header = self.header();
        let head = header.head.load(Relaxed);
        let tail = header.tail.load(Acquire);
        if head.wrapping_sub(tail) >= self.capacity as u64 {
            return false; // full
        }
        ptr::write(self.slot(head), *msg);
        header.head.store(head + 1, Release);
        true
    }

    /// Dequeue the oldest message, or `None` when the queue is empty.
    ///
    /// # Safety
    /// At most one thread may pop at a time.
    #[inline]
    pub unsafe fn pop(&self) -> Option<Message> {
        let header = self.header();
        let tail = header.tail.load(Relaxed);
        if tail == header.head.load(Acquire) {
            return None; // empty
        }
        let msg = ptr::read(self.slot(tail));
        header.tail.store(tail + 1, Release);
        Some(msg)
    }

    /// Push while holding the producer claim, so several publishing threads
    /// still behave as one producer. The claim covers a single slot write.
    ///
    /// The claim is a spin lock: if its holder is preempted mid-push, every
    /// other publisher of this component spins until it runs again. Use
    /// [`SpscQueue::push`] directly when one thread is the only producer.
    pub(crate) fn push_exclusive(&self, msg: &Message) -> bool {
        let writer = &self.header().writer;
        while writer
            .compare_exchange_weak(false, true, Acquire, Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
        // Safety: the claim makes this thread the only producer.
        let pushed = unsafe { self.push(msg) };
        writer.store(false, Release);
        pushed
    }

    /// Number of queued messages. Approximate while both ends are active.
    pub fn len(&self) -> usize {
        let header = self.header();
        let tail = header.tail.load(Acquire);
        let head = header.head.load(Acquire);
        head.saturating_sub(tail) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: usize) -> SpscQueue {
        let arena = Arc::new(Arena::new(SpscQueue::footprint(capacity).unwrap()).unwrap());
        arena.alloc_queue(capacity).unwrap()
    }

    #[test]
    fn footprint_covers_header_and_slots() {
        let fp = SpscQueue::footprint(8).unwrap();
        assert!(fp >= size_of::<QueueHeader>() + 8 * SpscQueue::slot_stride());
        assert_eq!(fp % QUEUE_ALIGN, 0);
    }

    #[test]
    fn footprint_overflow_is_none() {
        assert_eq!(SpscQueue::footprint(1 << 58), None);
        assert_eq!(SpscQueue::footprint(usize::MAX), None);
        // slots fit, header + rounding does not
        assert_eq!(SpscQueue::footprint(usize::MAX / SpscQueue::slot_stride()), None);
    }

    #[test]
    fn counters_wrap_onto_slots() {
        let q = queue(4);
        for round in 0..10u32 {
            unsafe {
                assert!(q.push(&Message::new(round)));
                assert_eq!(q.pop().map(|m| m.msg_type), Some(round));
            }
        }
        assert!(q.is_empty());
        assert_eq!(q.header().head.load(Relaxed), 10);
        assert_eq!(q.header().tail.load(Relaxed), 10);
    }

    #[test]
    fn exclusive_push_from_many_threads_loses_nothing() {
        let q = Arc::new(queue(1024));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let q = q.clone();
                std::thread::spawn(move || {
                    for i in 0..200u32 {
                        assert!(q.push_exclusive(&Message::new(t * 1000 + i)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(q.len(), 800);
        assert!(!q.header().writer.load(Relaxed));
    }
}
