//! Frame type for transaction stream framing.

use bytes::{Buf, BufMut, BytesMut};

use super::constants::*;

/// A single frame on the wire.
///
/// Each frame consists of:
/// - A 4-byte length field (little-endian), counting flags and content
/// - A 2-byte flags field (little-endian)
/// - Variable-length content
#[derive(Debug, Clone)]
pub struct Frame {
    /// The frame content (payload after flags).
    pub content: BytesMut,
    /// Frame flags indicating frame kind and properties.
    pub flags: u16,
}

impl Frame {
    /// Creates a new frame with the given content and flags.
    pub fn new(content: BytesMut, flags: u16) -> Self {
        Self { content, flags }
    }

    /// Creates a new empty frame with the given capacity and flags.
    pub fn with_capacity(capacity: usize, flags: u16) -> Self {
        Self::new(BytesMut::with_capacity(capacity), flags)
    }

    /// Returns true if this frame carries a request batch.
    pub fn is_request_batch(&self) -> bool {
        self.flags & REQUEST_BATCH_FLAG != 0
    }

    /// Returns true if this frame carries a server response.
    pub fn is_response(&self) -> bool {
        self.flags & RESPONSE_FLAG != 0
    }

    /// Returns true if this frame has the DONE flag set.
    pub fn is_done(&self) -> bool {
        self.flags & DONE_FLAG != 0
    }

    /// Returns the size of this frame on the wire.
    pub fn wire_size(&self) -> usize {
        SIZE_OF_FRAME_LENGTH_FIELD + self.frame_length()
    }

    /// Returns the frame length value (flags + content length).
    pub fn frame_length(&self) -> usize {
        SIZE_OF_FRAME_FLAGS_FIELD + self.content.len()
    }

    /// Writes this frame to the given buffer.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_size());
        dst.put_u32_le(self.frame_length() as u32);
        dst.put_u16_le(self.flags);
        dst.put_slice(&self.content);
    }

    /// Returns the declared frame length at the front of `src`, if the length
    /// field has fully arrived.
    pub fn peek_length(src: &[u8]) -> Option<usize> {
        if src.len() < SIZE_OF_FRAME_LENGTH_FIELD {
            return None;
        }
        Some(u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize)
    }

    /// Reads a frame from the given buffer.
    ///
    /// Returns `None` if there isn't enough data to read a complete frame, or
    /// if the declared length is too small to hold the flags field.
    pub fn read_from(src: &mut BytesMut) -> Option<Self> {
        let frame_length = Self::peek_length(&src[..])?;
        if frame_length < SIZE_OF_FRAME_FLAGS_FIELD {
            return None;
        }

        let total_frame_size = SIZE_OF_FRAME_LENGTH_FIELD + frame_length;
        if src.len() < total_frame_size {
            return None;
        }

        src.advance(SIZE_OF_FRAME_LENGTH_FIELD);
        let flags = src.get_u16_le();
        let content = src.split_to(frame_length - SIZE_OF_FRAME_FLAGS_FIELD);

        Some(Self::new(content, flags))
    }
}
