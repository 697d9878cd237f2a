// The per-component queue set and the publish path into it

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use super::component::ComponentId;
use super::Queue::SpscQueue;
use super::Structs::Message;
use crate::error::{KernelError, PublishError};
use crate::Core::arena::Arena;

/// One queue per registered component, all carved from one arena.
///
/// Slots are reserved for `max_components` queues up front; a queue is
/// installed when its component registers and never removed.
pub struct QueueSet {
    arena: Arc<Arena>,
    queues: Box<[OnceLock<SpscQueue>]>,
    registered: AtomicUsize,
    queue_capacity: usize,
}

impl QueueSet {
    pub fn new(max_components: usize, queue_capacity: usize) -> Result<Self, KernelError> {
        let arena = Arc::new(Arena::for_queues(queue_capacity, max_components)?);
        Ok(Self {
            arena,
            queues: (0..max_components).map(|_| OnceLock::new()).collect(),
            registered: AtomicUsize::new(0),
            queue_capacity,
        })
    }

    /// Allocate the queue for the next component and return its id.
    ///
    /// Only called from the registration phase, which holds `&mut Kernel`,
    /// so ids are handed out by a single thread.
    pub(crate) fn allocate(&self) -> Result<ComponentId, KernelError> {
        let index = self.registered.load(Ordering::Relaxed);
        if index >= self.queues.len() {
            return Err(KernelError::ComponentLimit {
                limit: self.queues.len(),
            });
        }

        let queue = self.arena.alloc_queue(self.queue_capacity)?;
        if self.queues[index].set(queue).is_err() {
            return Err(KernelError::InvalidConfig(format!(
                "queue slot {index} already taken"
            )));
        }
        self.registered.store(index + 1, Ordering::Release);
        Ok(index as ComponentId + 1)
    }

    /// Push `msg` into the queue of `sender_id`, stamping the sender.
    #[inline]
    pub fn publish(&self, sender_id: ComponentId, mut msg: Message) -> Result<(), PublishError> {
        let queue = self
            .get(sender_id)
            .ok_or(PublishError::InvalidSender { sender_id })?;

        msg.sender_id = sender_id;
        if queue.push_exclusive(&msg) {
            Ok(())
        } else {
            Err(PublishError::CapacityExceeded { sender_id })
        }
    }

    /// Queue of the component `id`, if it is registered.
    #[inline]
    pub fn get(&self, id: ComponentId) -> Option<&SpscQueue> {
        let registered = self.registered.load(Ordering::Acquire) as u64;
        if id == 0 || id > registered {
            return None;
        }
        self.queues[(id - 1) as usize].get()
    }

    /// Queue at position `index` (component id `index + 1`).
    #[inline]
    pub fn queue(&self, index: usize) -> Option<&SpscQueue> {
        self.get(index as ComponentId + 1)
    }

    /// Number of installed queues.
    pub fn len(&self) -> usize {
        self.registered.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limit(&self) -> usize {
        self.queues.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }
}

/// Cloneable handle a component uses to publish into its own queue.
#[derive(Clone)]
pub struct Publisher {
    id: ComponentId,
    queues: Arc<QueueSet>,
}

impl Publisher {
    pub(crate) fn new(id: ComponentId, queues: Arc<QueueSet>) -> Self {
        Self { id, queues }
    }

    /// Publish `msg` as this component.
    ///
    /// # Returns
    /// * `Ok(())` if the message was queued
    /// * `Err(PublishError::CapacityExceeded)` if the queue is full; nothing
    ///   was written and the caller decides whether to retry or drop
    #[inline]
    pub fn publish(&self, msg: Message) -> Result<(), PublishError> {
        self.queues.publish(self.id, msg)
    }

    /// Returns the component id this publisher sends as
    pub fn id(&self) -> ComponentId {
        self.id
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_from_one() {
        let set = QueueSet::new(3, 8).unwrap();
        assert_eq!(set.allocate().unwrap(), 1);
        assert_eq!(set.allocate().unwrap(), 2);
        assert_eq!(set.allocate().unwrap(), 3);
        assert!(matches!(
            set.allocate(),
            Err(KernelError::ComponentLimit { limit: 3 })
        ));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn publish_stamps_sender_and_targets_own_queue() {
        let set = Arc::new(QueueSet::new(2, 8).unwrap());
        let a = set.allocate().unwrap();
        let b = set.allocate().unwrap();
        let publisher = Publisher::new(b, set.clone());
        publisher.publish(Message::new(4)).unwrap();

        assert!(set.get(a).unwrap().is_empty());
        let msg = unsafe { set.get(b).unwrap().pop() }.unwrap();
        assert_eq!(msg.sender_id, b);
        assert_eq!(msg.msg_type, 4);
    }

    #[test]
    fn full_queue_reports_capacity_exceeded() {
        let set = QueueSet::new(1, 2).unwrap();
        let id = set.allocate().unwrap();
        set.publish(id, Message::new(1)).unwrap();
        set.publish(id, Message::new(1)).unwrap();
        assert_eq!(
            set.publish(id, Message::new(1)),
            Err(PublishError::CapacityExceeded { sender_id: id })
        );
    }
}
