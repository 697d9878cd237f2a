pub mod Queue;
pub mod Structs;
pub mod component;
pub mod kernel;
pub mod loader;
pub mod publisher;
pub mod subscription;
pub mod worker;

pub use component::{Component, ComponentContext, ComponentId, MessageType};
pub use kernel::Kernel;
pub use loader::{LoadReport, PluginDeclaration};
pub use publisher::{Publisher, QueueSet};
pub use subscription::{Handler, SubscriptionTable};
pub use worker::{RunningKernel, ShutdownMode, StopHandle, WorkerStats};
