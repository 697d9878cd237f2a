use crate::Bus::Queue::layout::{align_up, checked_align_up, QueueHeader, QUEUE_ALIGN};
use crate::Bus::Queue::SpscQueue;
use crate::Bus::Structs::Message;
use crate::Core::Region::{create_region, RegionBackend};
use std::alloc::Layout;
use std::io;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
mod debug;
mod getters;

// Use parking_lot's Mutex for better performance
use parking_lot::Mutex;

/// Monotonic region allocator for bus-internal memory.
///
/// Blocks are carved from one region reserved at startup and are never
/// individually freed; the whole region is released when the last
/// [`SpscQueue`] view and the arena itself are dropped.
pub struct Arena {
    region: Box<dyn RegionBackend>,
    /// Bump offset from the start of the region.
    offset: AtomicUsize,
    allocations: AtomicUsize,
    allocation_mutex: Mutex<()>, // serializes bump + bookkeeping
}

impl Arena {
    /// Reserve an arena of at least `size` bytes.
    pub fn new(size: usize) -> io::Result<Self> {
        let aligned_size = checked_align_up(size.max(1), QUEUE_ALIGN).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "arena size overflows usize")
        })?;

        let region = create_region(aligned_size).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!(
                    "Failed to reserve arena:\n\
                ├─ Aligned size: {aligned_size}\n\
                ╰─ Error: {e}"
                ),
            )
        })?;

        if (region.as_ptr() as usize) % QUEUE_ALIGN != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Arena region not properly aligned",
            ));
        }

        Ok(Self {
            region,
            offset: AtomicUsize::new(0),
            allocations: AtomicUsize::new(0),
            allocation_mutex: Mutex::new(()),
        })
    }

    /// Reserve an arena sized for `queues` queues of `capacity` slots each.
    pub fn for_queues(capacity: usize, queues: usize) -> io::Result<Self> {
        let size = queue_footprint(capacity)?.checked_mul(queues).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "arena size overflows usize")
        })?;
        Self::new(size)
    }

    /// Carve a block for `layout` out of the region.
    pub fn allocate(&self, layout: Layout) -> io::Result<NonNull<u8>> {
        let _guard = self.allocation_mutex.lock();

        let align = layout.align().max(QUEUE_ALIGN);
        let start = align_up(self.offset.load(Ordering::Relaxed), align);
        let end = start.checked_add(layout.size()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::OutOfMemory, "allocation size overflows")
        })?;

        if end > self.region.size() {
            return Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!(
                    "Not enough space in arena: requested {} bytes, {} available",
                    layout.size(),
                    self.region.size().saturating_sub(start)
                ),
            ));
        }

        self.offset.store(end, Ordering::Relaxed);
        self.allocations.fetch_add(1, Ordering::Relaxed);

        // Safety: `start < end <= size`, so the pointer stays inside the region.
        let ptr = unsafe { self.region.as_ptr().add(start) };
        NonNull::new(ptr)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "arena returned null"))
    }

    /// Allocate a queue of `capacity` slots. The queue keeps the arena alive.
    pub fn alloc_queue(self: &Arc<Self>, capacity: usize) -> io::Result<SpscQueue> {
        // Validate capacity is a power of two and non-zero
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Capacity must be a power of two and greater than zero",
            ));
        }

        let layout = Layout::from_size_align(queue_footprint(capacity)?, QUEUE_ALIGN)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let block = self.allocate(layout)?;

        let header = block.cast::<QueueHeader>();
        let slots_offset = align_up(std::mem::size_of::<QueueHeader>(), QUEUE_ALIGN);

        unsafe {
            std::ptr::write(header.as_ptr(), QueueHeader::new(capacity as u64));
            let slots = NonNull::new_unchecked(block.as_ptr().add(slots_offset)).cast::<Message>();
            Ok(SpscQueue::from_raw(header, slots, Arc::clone(self)))
        }
    }

    /// Total bytes handed out so far, including alignment padding.
    pub fn used_memory(&self) -> usize {
        self.offset.load(Ordering::Relaxed)
    }

    pub fn available_memory(&self) -> usize {
        self.region.size().saturating_sub(self.used_memory())
    }

    pub fn size(&self) -> usize {
        self.region.size()
    }
}

fn queue_footprint(capacity: usize) -> io::Result<usize> {
    SpscQueue::footprint(capacity).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("queue of {capacity} slots overflows usize"),
        )
    })
}

// Implement Send + Sync since we manage synchronization internally
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_aligned_and_disjoint() {
        let arena = Arena::new(4096).unwrap();
        let a = arena.allocate(Layout::from_size_align(10, 8).unwrap()).unwrap();
        let b = arena.allocate(Layout::from_size_align(10, 8).unwrap()).unwrap();
        assert_eq!(a.as_ptr() as usize % QUEUE_ALIGN, 0);
        assert_eq!(b.as_ptr() as usize % QUEUE_ALIGN, 0);
        assert!(b.as_ptr() as usize >= a.as_ptr() as usize + 10);
        assert_eq!(arena.allocation_count(), 2);
    }

    #[test]
    fn exhausted_arena_reports_out_of_memory() {
        let arena = Arc::new(Arena::for_queues(8, 2).unwrap());
        assert!(arena.alloc_queue(8).is_ok());
        assert!(arena.alloc_queue(8).is_ok());
        let err = arena.alloc_queue(8).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::OutOfMemory);
    }

    #[test]
    fn oversized_queue_is_rejected_before_reserving() {
        let err = Arena::for_queues(1 << 58, 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let arena = Arc::new(Arena::new(4096).unwrap());
        assert_eq!(
            arena.alloc_queue(1 << 58).unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
        assert_eq!(arena.used_memory(), 0);
        assert_eq!(
            Arena::new(usize::MAX).unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
    }

    #[test]
    fn non_power_of_two_capacity_is_rejected() {
        let arena = Arc::new(Arena::new(1 << 16).unwrap());
        assert_eq!(
            arena.alloc_queue(0).unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
        assert_eq!(
            arena.alloc_queue(12).unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
    }
}
