//! A pluggable message-routing kernel.
//!
//! Components register for message types and publish fixed-size
//! [`Message`]s into their own lock-free queue. A pool of core-pinned
//! workers drains the queues and hands every message to the handlers
//! subscribed to its type. Components can be compiled in or loaded from
//! shared libraries exporting a `register_plugin` declaration.

#[cfg(not(unix))]
compile_error!("microkernel requires a unix target (mmap and dlopen)");

// Module naming follows project convention
#[allow(non_snake_case)]
pub mod Bus;
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub(crate) mod Debug;

pub mod config;
pub mod error;
pub mod harness;

pub use Bus::Structs::{Message, PAYLOAD_INLINE};
pub use Bus::{
    Component, ComponentContext, ComponentId, Kernel, LoadReport, MessageType, PluginDeclaration,
    Publisher, RunningKernel, ShutdownMode, StopHandle, WorkerStats,
};
pub use config::{ConfigManager, KernelConfig, KernelSettings};
pub use error::{ConfigError, KernelError, LoadError, MessageError, PublishError};
