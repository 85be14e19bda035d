//! Wire framing for transaction streams.
//!
//! The client writes [`RequestBatch`] frames: many opaque requests in one
//! network write. The server answers with one [`Payload`] frame per response
//! part, in the order the requests were received. No frame carries a
//! correlation id.

mod codec;
pub mod constants;
mod frame;
mod message;

pub use codec::{ClientCodec, ServerCodec};
pub use constants::*;
pub use frame::Frame;
pub use message::{Payload, Request, RequestBatch};
