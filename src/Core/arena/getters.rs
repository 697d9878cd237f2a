use super::*;

/// Getter methods for Arena, used for debugging and monitoring.
impl Arena {
    /// Get the raw pointer to the start of the region
    ///
    /// # Safety
    /// The caller must ensure the pointer is not used after the arena is dropped
    pub fn base_ptr(&self) -> *const u8 {
        self.region.as_ptr()
    }

    /// Number of blocks handed out so far.
    ///
    /// Loaded with relaxed ordering since this is only used for monitoring.
    pub fn allocation_count(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Check whether another queue of `capacity` slots would still fit.
    pub fn can_fit_queue(&self, capacity: usize) -> bool {
        let start = align_up(self.used_memory(), QUEUE_ALIGN);
        SpscQueue::footprint(capacity)
            .and_then(|bytes| start.checked_add(bytes))
            .is_some_and(|end| end <= self.size())
    }
}
