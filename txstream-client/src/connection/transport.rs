//! The two seams between the multiplexer and the network.

use txstream_core::{ErrorCause, Payload, RequestBatch, Result};

/// Outbound half of a transaction sub-stream.
///
/// Every call to [`send`](RequestSink::send) is one network write. Calls for
/// the same sink are never made concurrently by the batcher, and batches are
/// handed over in transmission order.
pub trait RequestSink: Send + Sync + 'static {
    /// Writes one batch of requests.
    fn send(&self, batch: RequestBatch) -> Result<()>;

    /// Completes the outbound stream. Further sends fail.
    fn complete(&self);
}

/// Inbound half of a transaction stream.
///
/// Exactly one producer (the connection's reader) drives an observer. After
/// `on_error` or `on_completed` no more events are expected.
pub trait ResponseObserver: Send + Sync {
    /// Delivers one server payload.
    fn on_next(&self, payload: Payload);

    /// Reports that the stream failed.
    fn on_error(&self, cause: ErrorCause);

    /// Reports that the server closed the stream.
    fn on_completed(&self);
}
