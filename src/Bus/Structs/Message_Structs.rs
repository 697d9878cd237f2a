// Fixed-layout bus message; copied bit-for-bit into and out of queue slots

use std::fmt;

use crate::error::MessageError;

/// Size of the inline payload carried by every message.
/// Keeps `Message` at exactly two cache lines (128 bytes).
pub const PAYLOAD_INLINE: usize = 112;

/// A bus message. `Copy`, no owned heap memory, no destructor.
///
/// `#[repr(C)]` keeps the layout stable so a slot can be overwritten in place
/// without any destruction ordering concerns.
#[repr(C)]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Message {
    /// Routing tag. Tags are sparse; only equality matters.
    pub msg_type: u32,
    /// Number of meaningful bytes in `payload`.
    pub payload_len: u16,
    /// Free for application use; the kernel never reads it.
    pub flags: u16,
    /// Id of the publishing component, stamped by the kernel on publish.
    pub sender_id: u64,
    pub payload: [u8; PAYLOAD_INLINE],
}

impl Message {
    /// An empty message of the given type.
    pub const fn new(msg_type: u32) -> Self {
        Self {
            msg_type,
            payload_len: 0,
            flags: 0,
            sender_id: 0,
            payload: [0; PAYLOAD_INLINE],
        }
    }

    /// A message of the given type carrying a copy of `payload`.
    pub fn with_payload(msg_type: u32, payload: &[u8]) -> Result<Self, MessageError> {
        if payload.len() > PAYLOAD_INLINE {
            return Err(MessageError::PayloadTooLarge {
                len: payload.len(),
                max: PAYLOAD_INLINE,
            });
        }
        let mut msg = Self::new(msg_type);
        msg.payload[..payload.len()].copy_from_slice(payload);
        msg.payload_len = payload.len() as u16;
        Ok(msg)
    }

    /// The meaningful part of the payload.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        let len = (self.payload_len as usize).min(PAYLOAD_INLINE);
        &self.payload[..len]
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("msg_type", &self.msg_type)
            .field("sender_id", &self.sender_id)
            .field("flags", &self.flags)
            .field("payload", &self.payload())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_copied_inline() {
        let msg = Message::with_payload(7, b"tick").unwrap();
        assert_eq!(msg.msg_type, 7);
        assert_eq!(msg.payload(), b"tick");
        assert_eq!(msg.sender_id, 0);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let big = [0u8; PAYLOAD_INLINE + 1];
        assert_eq!(
            Message::with_payload(1, &big),
            Err(MessageError::PayloadTooLarge {
                len: PAYLOAD_INLINE + 1,
                max: PAYLOAD_INLINE
            })
        );
        assert!(Message::with_payload(1, &big[..PAYLOAD_INLINE]).is_ok());
    }

    #[test]
    fn message_fills_two_cache_lines() {
        assert_eq!(std::mem::size_of::<Message>(), 128);
    }
}
