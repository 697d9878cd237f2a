//! Composition root of the bus: registration phase.
//!
//! A [`Kernel`] collects components, their queues and their subscriptions.
//! It is only ever mutated through `&mut self`, on one thread, before
//! [`Kernel::start`] consumes it and hands the frozen tables to the worker
//! pool. Registering after start is therefore impossible by construction.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::component::{Component, ComponentContext, ComponentId, MessageType};
use super::publisher::{Publisher, QueueSet};
use super::Queue::SpscQueue;
use super::subscription::SubscriptionTable;
use super::Structs::Message;
use crate::config::KernelSettings;
use crate::error::{KernelError, PublishError};
use crate::Core::dylib::RetainedLibrary;

pub struct Kernel {
    pub(crate) settings: KernelSettings,
    pub(crate) queues: Arc<QueueSet>,
    pub(crate) components: Vec<Box<dyn Component>>,
    pub(crate) subscriptions: SubscriptionTable,
    pub(crate) libraries: Vec<RetainedLibrary>,
}

impl Kernel {
    /// Reserve the arena and queue slots described by `settings`.
    pub fn new(settings: KernelSettings) -> Result<Self, KernelError> {
        if settings.queue_capacity == 0 || !settings.queue_capacity.is_power_of_two() {
            return Err(KernelError::InvalidConfig(format!(
                "queue_capacity must be a non-zero power of two, got {}",
                settings.queue_capacity
            )));
        }
        if settings.max_components == 0 {
            return Err(KernelError::InvalidConfig(
                "max_components must be greater than zero".to_string(),
            ));
        }
        let arena_bytes = SpscQueue::footprint(settings.queue_capacity)
            .and_then(|bytes| bytes.checked_mul(settings.max_components));
        if arena_bytes.is_none() {
            return Err(KernelError::InvalidConfig(format!(
                "{} queues of {} slots do not fit in the address space",
                settings.max_components, settings.queue_capacity
            )));
        }

        let queues = Arc::new(QueueSet::new(
            settings.max_components,
            settings.queue_capacity,
        )?);
        info!(
            queue_capacity = settings.queue_capacity,
            max_components = settings.max_components,
            arena_bytes = queues.arena().size(),
            "kernel created"
        );

        Ok(Self {
            settings,
            queues,
            components: Vec::new(),
            subscriptions: SubscriptionTable::new(),
            libraries: Vec::new(),
        })
    }

    /// Register `component` for every type in `types`.
    ///
    /// Stores the component, allocates its queue, appends one handler per
    /// type, then runs `init` and `start` on this thread before returning
    /// the new id.
    pub fn register<C>(&mut self, component: C, types: &[MessageType]) -> Result<ComponentId, KernelError>
    where
        C: Component + 'static,
    {
        self.register_boxed(Box::new(component), types)
    }

    pub fn register_boxed(
        &mut self,
        component: Box<dyn Component>,
        types: &[MessageType],
    ) -> Result<ComponentId, KernelError> {
        if types.is_empty() {
            return Err(KernelError::NoSubscriptions {
                name: component.name().to_string(),
            });
        }

        let id = self.queues.allocate()?;
        self.components.push(component);
        for &msg_type in types {
            self.subscriptions.subscribe(msg_type, id);
        }

        let ctx = ComponentContext::new(id, Publisher::new(id, Arc::clone(&self.queues)));
        let component = &mut self.components[(id - 1) as usize];
        component.init(&ctx);
        component.start(&ctx);

        info!(id, name = component.name(), types = ?types, "component registered");
        Ok(id)
    }

    /// Enqueue `msg` on the sender's own queue. Routing to subscribers
    /// happens later, at dispatch, by message type.
    #[inline]
    pub fn publish(&self, sender_id: ComponentId, msg: Message) -> Result<(), PublishError> {
        self.queues.publish(sender_id, msg)
    }

    /// A publish handle for component `id`, if it is registered.
    pub fn publisher(&self, id: ComponentId) -> Option<Publisher> {
        self.queues
            .get(id)
            .map(|_| Publisher::new(id, Arc::clone(&self.queues)))
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Id the next registered component will receive.
    pub fn next_id(&self) -> ComponentId {
        self.components.len() as ComponentId + 1
    }

    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    pub fn queues(&self) -> &QueueSet {
        &self.queues
    }

    pub fn settings(&self) -> &KernelSettings {
        &self.settings
    }

    /// Libraries whose components joined this kernel.
    pub fn libraries(&self) -> &[RetainedLibrary] {
        &self.libraries
    }

    pub(crate) fn retain_library(&mut self, library: RetainedLibrary) {
        debug!(path = %library.path().display(), "library retained");
        self.libraries.push(library);
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_kernel(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn settings() -> KernelSettings {
        KernelSettings {
            workers: 1,
            queue_capacity: 8,
            max_components: 4,
        }
    }

    struct Lifecycle {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Component for Lifecycle {
        fn init(&mut self, ctx: &ComponentContext) {
            self.log.lock().push(format!("init {}", ctx.id()));
        }
        fn start(&mut self, ctx: &ComponentContext) {
            self.log.lock().push(format!("start {}", ctx.id()));
        }
        fn handle_message(&self, _msg: &Message) {
            self.log.lock().push("handle".to_string());
        }
    }

    #[test]
    fn rejects_bad_sizing() {
        let mut s = settings();
        s.queue_capacity = 6;
        assert!(matches!(Kernel::new(s), Err(KernelError::InvalidConfig(_))));
        let mut s = settings();
        s.max_components = 0;
        assert!(matches!(Kernel::new(s), Err(KernelError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_capacity_that_overflows_the_arena_size() {
        let s = KernelSettings {
            workers: 1,
            queue_capacity: 1 << 58,
            max_components: 1,
        };
        assert!(matches!(Kernel::new(s), Err(KernelError::InvalidConfig(_))));

        // each queue fits, all of them together do not
        let s = KernelSettings {
            workers: 1,
            queue_capacity: 1 << 40,
            max_components: 1 << 20,
        };
        assert!(matches!(Kernel::new(s), Err(KernelError::InvalidConfig(_))));
    }

    #[test]
    fn hooks_run_in_order_during_register() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut kernel = Kernel::new(settings()).unwrap();
        let id = kernel
            .register(Lifecycle { log: log.clone() }, &[1, 2, 3])
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(*log.lock(), vec!["init 1".to_string(), "start 1".to_string()]);
        assert_eq!(kernel.subscriptions().len(), 3);
        assert_eq!(kernel.next_id(), 2);
    }

    #[test]
    fn empty_type_set_is_rejected_without_side_effects() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut kernel = Kernel::new(settings()).unwrap();
        let err = kernel.register(Lifecycle { log: log.clone() }, &[]).unwrap_err();
        assert!(matches!(err, KernelError::NoSubscriptions { .. }));
        assert_eq!(kernel.component_count(), 0);
        assert_eq!(kernel.queues().len(), 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn publisher_only_for_registered_ids() {
        let mut kernel = Kernel::new(settings()).unwrap();
        let id = kernel
            .register(Lifecycle { log: Arc::default() }, &[1])
            .unwrap();
        assert_eq!(kernel.publisher(id).map(|p| p.id()), Some(id));
        assert!(kernel.publisher(0).is_none());
        assert!(kernel.publisher(id + 1).is_none());
    }
}
