pub mod Message_Structs;

pub use Message_Structs::{Message, PAYLOAD_INLINE}; // re-export for stable path
