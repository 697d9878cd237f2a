// The per-component bounded queue - one producer role, one consumer role

use super::layout::QueueHeader;
use crate::Bus::Structs::Message;
use crate::Core::arena::Arena;

use std::ptr::NonNull;
use std::sync::Arc;

/// A fixed-capacity, lock-free, single-producer single-consumer ring of
/// [`Message`]s living inside an [`Arena`].
///
/// ### Concurrency Design:
/// - **Producer (push)**: writes slot `head & mask`, then publishes the new
///   `head` with release ordering.
/// - **Consumer (pop)**: observes `head` with acquire ordering, copies slot
///   `tail & mask` out, then publishes the new `tail` with release ordering so
///   the producer may reuse the slot.
///
/// Both counters grow monotonically; `head - tail` is always in `[0, capacity]`.
/// The view keeps its arena alive, so the slots never dangle.
pub struct SpscQueue {
    /// Control block in the arena.
    pub(crate) header: NonNull<QueueHeader>,

    /// First slot of this queue's band in the arena.
    pub(crate) slots: NonNull<Message>,

    pub(crate) capacity: usize,

    /// `capacity - 1`, used to wrap the counters onto slots.
    pub(crate) mask: usize,

    pub(crate) _arena: Arc<Arena>,
}

unsafe impl Send for SpscQueue {}
unsafe impl Sync for SpscQueue {}
