//! Outbound request batching.

mod batcher;
mod executor;

pub use batcher::{Dispatcher, RequestBatcher};
