//! Request batching across a fixed pool of executors.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::debug;
use txstream_core::{Request, Result, TxStreamError};

use super::executor::{DispatcherQueue, Executor};
use crate::config::BatchConfig;
use crate::connection::{RequestSink, ResponseObserver};

struct BatcherShared {
    executors: Vec<Arc<Executor>>,
    next_executor: AtomicUsize,
    next_dispatcher: AtomicU64,
    // Dispatch holds the read side, close the write side.
    open: RwLock<bool>,
    shutdown: CancellationToken,
    max_batch_size: usize,
}

impl BatcherShared {
    fn close(&self) {
        let mut open = self.open.write().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return;
        }
        *open = false;
        for executor in &self.executors {
            executor.close();
        }
        self.shutdown.cancel();
        debug!(executors = self.executors.len(), "request batcher closed");
    }
}

/// Coalesces requests from many callers into batched writes.
///
/// Each [`Dispatcher`] is bound to one outbound sub-stream and assigned
/// round-robin to one of a fixed number of executors. An executor's flush loop
/// sleeps for the batch window once woken, then sends everything queued on its
/// dispatchers, one write per dispatcher, and keeps doing so while work keeps
/// arriving.
///
/// Dropping the batcher closes it.
pub struct RequestBatcher {
    shared: Arc<BatcherShared>,
}

impl std::fmt::Debug for RequestBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBatcher")
            .field("executors", &self.shared.executors.len())
            .field("open", &self.is_open())
            .finish()
    }
}

impl RequestBatcher {
    /// Creates a batcher and spawns one flush loop per executor.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(config: &BatchConfig) -> Self {
        let shutdown = CancellationToken::new();
        let executors = (0..config.executor_count())
            .map(|id| Executor::spawn(id, config, shutdown.child_token()))
            .collect();

        Self {
            shared: Arc::new(BatcherShared {
                executors,
                next_executor: AtomicUsize::new(0),
                next_dispatcher: AtomicU64::new(1),
                open: RwLock::new(true),
                shutdown,
                max_batch_size: config.max_batch_size(),
            }),
        }
    }

    /// Creates a dispatcher writing to `sink` on the next executor in turn.
    ///
    /// # Errors
    ///
    /// Returns [`TxStreamError::ClientClosed`] after [`close`](Self::close).
    pub fn dispatcher(&self, sink: Arc<dyn RequestSink>) -> Result<Dispatcher> {
        self.register(sink, None)
    }

    /// Like [`dispatcher`](Self::dispatcher), but a failed write to `sink` is
    /// reported to `observer` through
    /// [`on_error`](ResponseObserver::on_error).
    ///
    /// Pass the listener of the stream the sink belongs to: once a batch is
    /// lost, no later response on that stream can be matched to its caller.
    pub fn dispatcher_with_observer(
        &self,
        sink: Arc<dyn RequestSink>,
        observer: Arc<dyn ResponseObserver>,
    ) -> Result<Dispatcher> {
        self.register(sink, Some(observer))
    }

    fn register(
        &self,
        sink: Arc<dyn RequestSink>,
        observer: Option<Arc<dyn ResponseObserver>>,
    ) -> Result<Dispatcher> {
        let open = self.shared.open.read().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return Err(TxStreamError::ClientClosed);
        }

        let index = self.shared.next_executor.fetch_add(1, Ordering::Relaxed)
            % self.shared.executors.len();
        let executor = Arc::clone(&self.shared.executors[index]);
        let id = self.shared.next_dispatcher.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(DispatcherQueue::new(
            id,
            sink,
            observer,
            self.shared.max_batch_size,
        ));
        executor.register(Arc::clone(&queue));

        debug!(dispatcher = id, executor = executor.id(), "dispatcher registered");
        Ok(Dispatcher {
            queue,
            executor,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Closes the batcher.
    ///
    /// Every dispatcher's queue is cleared and its sink completed. Closing is
    /// terminal: later dispatches and `dispatcher` calls fail with
    /// [`TxStreamError::ClientClosed`].
    pub fn close(&self) {
        self.shared.close();
    }

    /// Returns true until [`close`](Self::close) is called.
    pub fn is_open(&self) -> bool {
        *self.shared.open.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the size of the executor pool.
    pub fn executor_count(&self) -> usize {
        self.shared.executors.len()
    }

    /// Returns the number of dispatchers currently registered per executor.
    pub fn dispatcher_counts(&self) -> Vec<usize> {
        self.shared
            .executors
            .iter()
            .map(|executor| executor.dispatcher_count())
            .collect()
    }
}

impl Drop for RequestBatcher {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Outbound queue for one sub-stream.
///
/// Requests are transmitted in the order `dispatch` and `dispatch_now` are
/// called. Dropping the dispatcher closes it.
pub struct Dispatcher {
    queue: Arc<DispatcherQueue>,
    executor: Arc<Executor>,
    shared: Arc<BatcherShared>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("id", &self.queue.id())
            .field("executor", &self.executor.id())
            .field("closed", &self.queue.is_closed())
            .finish()
    }
}

impl Dispatcher {
    /// Queues a request for the next flush of this dispatcher's executor.
    ///
    /// # Errors
    ///
    /// Returns [`TxStreamError::ClientClosed`] if the batcher or this
    /// dispatcher has been closed.
    pub fn dispatch(&self, request: Request) -> Result<()> {
        self.enqueue(request)?;
        self.executor.may_start_running();
        Ok(())
    }

    /// Queues a request and flushes this dispatcher immediately, without
    /// waiting for the batch window. Anything queued earlier goes out first.
    ///
    /// # Errors
    ///
    /// Returns [`TxStreamError::ClientClosed`] if the batcher or this
    /// dispatcher has been closed, and [`TxStreamError::Transport`] if the
    /// sink rejected the write. A failed write closes the dispatcher.
    pub fn dispatch_now(&self, request: Request) -> Result<()> {
        self.enqueue(request)?;
        if let Err(e) = self.queue.flush() {
            self.executor.deregister(self.queue.id());
            return Err(e);
        }
        Ok(())
    }

    fn enqueue(&self, request: Request) -> Result<()> {
        let open = self.shared.open.read().unwrap_or_else(PoisonError::into_inner);
        if !*open || !self.queue.push(request) {
            return Err(TxStreamError::ClientClosed);
        }
        Ok(())
    }

    /// Sends anything still queued, completes the sink and detaches this
    /// dispatcher from its executor. Idempotent.
    pub fn close(&self) {
        self.executor.deregister(self.queue.id());
        if !self.queue.is_closed() {
            self.queue.close();
            debug!(dispatcher = self.queue.id(), "dispatcher closed");
        }
    }

    /// Returns true once this dispatcher or its batcher has been closed.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.close();
    }
}
