//! The component contract: lifecycle hooks plus a message handler.

use super::publisher::Publisher;
use super::Structs::Message;
use crate::error::PublishError;

/// Kernel-issued component id. Dense, starts at 1, never reused.
pub type ComponentId = u64;

/// Routing tag carried in [`Message::msg_type`].
pub type MessageType = u32;

/// What a component gets to see about itself during `init` and `start`.
pub struct ComponentContext {
    id: ComponentId,
    publisher: Publisher,
}

impl ComponentContext {
    pub(crate) fn new(id: ComponentId, publisher: Publisher) -> Self {
        Self { id, publisher }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// A handle the component can keep to publish later, including from
    /// inside `handle_message`.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    pub fn publish(&self, msg: Message) -> Result<(), PublishError> {
        self.publisher.publish(msg)
    }
}

/// A unit attached to the bus.
///
/// `init` and `start` run once each, in that order, on the registering
/// thread before the component's handler can be invoked. `handle_message`
/// runs on worker threads, possibly on several at once for messages that come
/// from different queues, and must return quickly.
pub trait Component: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "component"
    }

    fn init(&mut self, _ctx: &ComponentContext) {}

    fn start(&mut self, _ctx: &ComponentContext) {}

    fn handle_message(&self, msg: &Message);

    /// Called once after the worker pool has stopped.
    fn stop(&self) {}
}
