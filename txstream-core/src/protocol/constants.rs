//! Wire constants for transaction stream framing.

/// Size of the frame length field in bytes.
pub const SIZE_OF_FRAME_LENGTH_FIELD: usize = 4;

/// Size of the frame flags field in bytes.
pub const SIZE_OF_FRAME_FLAGS_FIELD: usize = 2;

/// Total frame header size (length + flags).
pub const FRAME_HEADER_SIZE: usize = SIZE_OF_FRAME_LENGTH_FIELD + SIZE_OF_FRAME_FLAGS_FIELD;

/// Size of the request count field at the start of a batch frame.
pub const SIZE_OF_BATCH_COUNT_FIELD: usize = 4;

/// Size of the length prefix in front of every request body in a batch.
pub const SIZE_OF_REQUEST_LENGTH_FIELD: usize = 4;

/// Size of the iterator id field at the start of a response frame.
pub const SIZE_OF_ITERATOR_ID_FIELD: usize = 8;

/// Largest frame (flags + content) accepted by the decoders.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Request batch flag - the frame carries one or more client requests.
pub const REQUEST_BATCH_FLAG: u16 = 1 << 15;

/// Response flag - the frame carries one server payload.
pub const RESPONSE_FLAG: u16 = 1 << 14;

/// Done flag - the server has no more parts for the current request.
pub const DONE_FLAG: u16 = 1 << 13;

/// Default frame flags (no special flags set).
pub const DEFAULT_FLAGS: u16 = 0;

/// Iterator id carried by payloads that do not continue a cursor.
pub const INITIAL_ITERATOR_ID: u64 = 0;
