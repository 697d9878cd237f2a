use std::fmt;
use crate::Bus::Queue::SpscQueue;
use crate::Bus::kernel::Kernel;
use crate::Core::arena::Arena;

/// Debug function for Arena
///
/// Provides a safe debug representation that shows:
/// - Region base pointer
/// - Bytes used / total
/// - Number of blocks handed out
pub fn debug_arena(arena: &Arena, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Arena")
        .field("region", &format_args!("{:p}", arena.base_ptr()))
        .field("used", &arena.used_memory())
        .field("size", &arena.size())
        .field("allocations", &arena.allocation_count())
        .finish()
}

/// Debug function for SpscQueue
///
/// Shows the slot band location and fill level without touching the slots
pub fn debug_queue(queue: &SpscQueue, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SpscQueue")
        .field("slots", &format_args!("0x{:x}", queue.slots.as_ptr() as usize))
        .field("capacity", &queue.capacity())
        .field("len", &queue.len())
        .finish_non_exhaustive()
}

pub fn debug_kernel(kernel: &Kernel, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Kernel")
        .field("components", &kernel.component_count())
        .field("subscribed_types", &kernel.subscriptions().type_count())
        .field("libraries", &kernel.libraries().len())
        .field("settings", kernel.settings())
        .finish()
}
