//! Type-keyed subscription table.

use std::collections::HashMap;

use super::component::{Component, ComponentId, MessageType};
use super::Structs::Message;

/// One entry in a type's handler list: routes a message into the
/// `handle_message` of the component it was registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handler {
    component_id: ComponentId,
}

impl Handler {
    pub fn component_id(&self) -> ComponentId {
        self.component_id
    }

    /// `components[i]` holds the component with id `i + 1`.
    #[inline]
    pub fn invoke(&self, components: &[Box<dyn Component>], msg: &Message) {
        if let Some(component) = components.get((self.component_id - 1) as usize) {
            component.handle_message(msg);
        }
    }
}

/// Message type → ordered handler list.
///
/// Built while components register. Once the kernel starts it is moved into
/// a shared, read-only snapshot and never mutated again.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entries: HashMap<MessageType, Vec<Handler>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `component_id` to the list of `msg_type`.
    /// Duplicates are kept: the component then receives the message twice.
    pub fn subscribe(&mut self, msg_type: MessageType, component_id: ComponentId) {
        self.entries
            .entry(msg_type)
            .or_default()
            .push(Handler { component_id });
    }

    /// Handlers registered for `msg_type`, in registration order.
    #[inline]
    pub fn handlers(&self, msg_type: MessageType) -> &[Handler] {
        self.entries
            .get(&msg_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Invoke every handler for the message's type. Returns how many ran.
    #[inline]
    pub fn dispatch(&self, components: &[Box<dyn Component>], msg: &Message) -> usize {
        let handlers = self.handlers(msg.msg_type);
        for handler in handlers {
            handler.invoke(components, msg);
        }
        handlers.len()
    }

    /// Number of distinct subscribed types.
    pub fn type_count(&self) -> usize {
        self.entries.len()
    }

    /// Total number of handler entries across all types.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
