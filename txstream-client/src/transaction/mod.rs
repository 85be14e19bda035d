//! Caller-facing transaction streams.
//!
//! A [`TransactionStream`] multiplexes many concurrent callers over one
//! bidirectional connection. Every submission registers a collector with the
//! stream's [`ResponseListener`] and enqueues the request on its
//! [`Dispatcher`] under one lock, so collectors are registered in exactly the
//! order their requests are transmitted.
//!
//! # Example
//!
//! ```ignore
//! use txstream_client::{ClientConfig, TransactionClient};
//! use txstream_core::Request;
//!
//! let client = TransactionClient::new(ClientConfig::default());
//! let tx = client.connect("127.0.0.1:1729".parse()?).await?;
//!
//! let answer = tx.execute(Request::from("match $x;")).await?;
//! let mut rows = tx.stream(Request::from("fetch"), |id| {
//!     Request::new(id.to_le_bytes().to_vec())
//! })?;
//! while let Some(row) = rows.next().await {
//!     println!("{:?}", row?);
//! }
//! tx.close();
//! ```

mod response_stream;

pub use response_stream::ResponseStream;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};
use txstream_core::{Payload, Request, Result, TxStreamError};

use crate::connection::{ConnectionId, ResponseObserver};
use crate::dispatch::Dispatcher;
use crate::stream::{
    MultiResponseCollector, ResponseCollector, ResponseListener, ResponseParts, SingleResponse,
    SingleResponseCollector,
};

struct StreamInner {
    id: ConnectionId,
    dispatcher: Dispatcher,
    listener: ResponseListener,
    // Held across registration and enqueueing.
    send_lock: Mutex<()>,
    open: AtomicBool,
    response_timeout: Option<Duration>,
}

/// A transaction carried over one bidirectional stream.
///
/// Cheap to clone; clones share the same stream.
#[derive(Clone)]
pub struct TransactionStream {
    inner: Arc<StreamInner>,
}

impl std::fmt::Debug for TransactionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStream")
            .field("id", &self.inner.id)
            .field("open", &self.is_open())
            .finish()
    }
}

impl TransactionStream {
    pub(crate) fn new(
        id: ConnectionId,
        dispatcher: Dispatcher,
        listener: ResponseListener,
        response_timeout: Option<Duration>,
    ) -> Self {
        debug!(connection = %id, "transaction stream opened");
        Self {
            inner: Arc::new(StreamInner {
                id,
                dispatcher,
                listener,
                send_lock: Mutex::new(()),
                open: AtomicBool::new(true),
                response_timeout,
            }),
        }
    }

    /// Returns the identifier of the underlying connection.
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Submits a request answered by exactly one response.
    ///
    /// With `batch` the request waits for the next flush of its executor;
    /// without it, it is written immediately along with anything queued
    /// before it.
    pub fn single(&self, request: Request, batch: bool) -> Result<SingleResponse> {
        let (collector, response) = SingleResponseCollector::new();
        self.submit(collector, request, batch)?;
        Ok(response)
    }

    /// Submits a batched request and waits for its payload, bounded by the
    /// configured response timeout if there is one.
    pub async fn execute(&self, request: Request) -> Result<Payload> {
        let response = self.single(request, true)?;
        match self.inner.response_timeout {
            Some(timeout) => response.get_timeout(timeout).await?.ok(),
            None => response.payload().await,
        }
    }

    /// Submits a request answered by a stream of parts.
    ///
    /// When the server pauses the stream with an iterator id, `continuation`
    /// builds the follow-up request for that id. The returned stream issues it
    /// transparently.
    pub fn stream<F>(&self, request: Request, continuation: F) -> Result<ResponseStream>
    where
        F: Fn(u64) -> Request + Send + Sync + 'static,
    {
        let parts = self.parts(request)?;
        Ok(ResponseStream::new(self.clone(), parts, Arc::new(continuation)))
    }

    /// Submits a request and returns its raw parts, including the payload
    /// that ends the sequence.
    pub fn parts(&self, request: Request) -> Result<ResponseParts> {
        let (collector, parts) = MultiResponseCollector::new();
        self.submit(collector, request, true)?;
        Ok(parts)
    }

    fn submit<C: ResponseCollector>(&self, collector: C, request: Request, batch: bool) -> Result<()> {
        let _guard = self
            .inner
            .send_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.ensure_open()?;

        self.inner.listener.add_collector(collector)?;
        let dispatched = if batch {
            self.inner.dispatcher.dispatch(request)
        } else {
            self.inner.dispatcher.dispatch_now(request)
        };

        if let Err(e) = dispatched {
            // The registered collector has no request on the wire and would
            // take the next request's response.
            warn!(connection = %self.inner.id, error = %e, "request not dispatched after registration");
            self.inner.listener.terminate(TxStreamError::ClientClosed);
            return Err(e);
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.inner.open.load(Ordering::Acquire) {
            return Err(TxStreamError::ClientClosed);
        }
        if self.inner.listener.is_terminated() {
            return Err(TxStreamError::ListenerTerminated);
        }
        Ok(())
    }

    /// Closes the stream.
    ///
    /// Queued requests are still written before the outbound stream is
    /// completed; callers still waiting receive
    /// [`TxStreamError::StreamInterrupted`]. Idempotent.
    pub fn close(&self) {
        let _guard = self
            .inner
            .send_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.open.swap(false, Ordering::AcqRel) {
            self.inner.dispatcher.close();
            self.inner.listener.on_completed();
            debug!(connection = %self.inner.id, "transaction stream closed");
        }
    }

    /// Returns true until the stream is closed or its connection ends.
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire) && !self.inner.listener.is_terminated()
    }
}
