pub mod Queue;
pub mod Queue_impl;
pub mod layout;

pub use Queue::SpscQueue; // re-export for stable path
