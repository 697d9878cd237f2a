pub mod Region;
pub mod affinity;
pub mod arena;
pub mod dylib;

pub use Region::{create_region, RegionBackend};
pub use arena::Arena;
pub use dylib::{Library, RetainedLibrary};
