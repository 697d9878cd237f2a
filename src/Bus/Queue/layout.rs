use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicBool, AtomicU64};

/// Alignment of every block handed out by the arena, and of queue headers.
pub const QUEUE_ALIGN: usize = 128;

/// Control block of one SPSC queue, placed in the arena right before its slots.
///
/// The two cursors live on separate cache lines so the producer and the
/// consumer never write to the same line.
#[repr(C, align(128))]
pub struct QueueHeader {
    /// Number of slots. Always a power of two.
    pub capacity: u64,

    /// Producer claim. Held for the duration of one push when several threads
    /// publish on behalf of the same component.
    pub writer: AtomicBool,

    /// Next write index. Advanced only by the producer (release).
    pub head: CachePadded<AtomicU64>,

    /// Next read index. Advanced only by the consumer (release).
    pub tail: CachePadded<AtomicU64>,
}

impl QueueHeader {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            writer: AtomicBool::new(false),
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
        }
    }
}

/// Round `value` up to the next multiple of `align` (a power of two).
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// [`align_up`] that returns `None` instead of overflowing.
#[inline]
pub const fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}
