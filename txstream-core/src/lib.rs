//! Core types and wire framing for transaction stream multiplexing.

#![warn(missing_docs)]

pub mod error;
pub mod protocol;

pub use error::{ErrorCause, Result, TxStreamError};
pub use protocol::{Payload, Request, RequestBatch};
