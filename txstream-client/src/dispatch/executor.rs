//! Per-executor flush loop and per-dispatcher outbound queues.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_queue::SegQueue;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use txstream_core::{ErrorCause, Request, RequestBatch, Result, TxStreamError};

use crate::config::BatchConfig;
use crate::connection::{RequestSink, ResponseObserver};

pub(crate) type DispatcherId = u64;

/// Lock-free outbound queue bound to one sink.
///
/// A failed write closes the queue and reports the cause to the observer, if
/// any: requests already taken from the queue never reached the wire, so the
/// responses that follow can no longer be matched to their callers.
pub(crate) struct DispatcherQueue {
    id: DispatcherId,
    queue: SegQueue<Request>,
    // Serializes pushes, drains and closing so batches reach the sink in
    // enqueue order and nothing is queued behind a completed sink.
    flush_lock: Mutex<()>,
    sink: Arc<dyn RequestSink>,
    observer: Option<Arc<dyn ResponseObserver>>,
    closed: AtomicBool,
    max_batch_size: usize,
}

impl DispatcherQueue {
    pub(crate) fn new(
        id: DispatcherId,
        sink: Arc<dyn RequestSink>,
        observer: Option<Arc<dyn ResponseObserver>>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            id,
            queue: SegQueue::new(),
            flush_lock: Mutex::new(()),
            sink,
            observer,
            closed: AtomicBool::new(false),
            max_batch_size,
        }
    }

    pub(crate) fn id(&self) -> DispatcherId {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a request. Returns false if the queue is already closed.
    pub(crate) fn push(&self, request: Request) -> bool {
        let _guard = self.lock();
        if self.is_closed() {
            return false;
        }
        self.queue.push(request);
        true
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sends everything queued, at most `max_batch_size` requests per write.
    /// Returns the number of requests handed to the sink.
    ///
    /// # Errors
    ///
    /// Returns [`TxStreamError::Transport`] if the sink rejects a batch. The
    /// queue is closed at that point.
    pub(crate) fn flush(&self) -> Result<usize> {
        let _guard = self.lock();
        self.drain()
    }

    fn drain(&self) -> Result<usize> {
        let mut flushed = 0;
        loop {
            let mut requests = Vec::new();
            while requests.len() < self.max_batch_size {
                match self.queue.pop() {
                    Some(request) => requests.push(request),
                    None => break,
                }
            }
            if requests.is_empty() {
                return Ok(flushed);
            }

            let count = requests.len();
            if let Err(e) = self.sink.send(RequestBatch::new(requests)) {
                return Err(self.fail(count, e));
            }
            flushed += count;
        }
    }

    fn fail(&self, count: usize, error: TxStreamError) -> TxStreamError {
        warn!(dispatcher = self.id, requests = count, error = %error, "failed to send batch");
        let cause: ErrorCause = Arc::new(error);

        let already_closed = self.closed.swap(true, Ordering::AcqRel);
        while self.queue.pop().is_some() {}
        if !already_closed {
            self.sink.complete();
        }
        if let Some(observer) = &self.observer {
            observer.on_error(Arc::clone(&cause));
        }
        TxStreamError::Transport(cause)
    }

    /// Flushes anything still queued and completes the sink.
    pub(crate) fn close(&self) {
        let _guard = self.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // A failed final write has already been reported to the observer.
        let _ = self.drain();
        self.sink.complete();
    }

    /// Drops anything still queued and completes the sink.
    pub(crate) fn abort(&self) {
        let _guard = self.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut dropped = 0usize;
        while self.queue.pop().is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dispatcher = self.id, requests = dropped, "discarded queued requests");
        }
        self.sink.complete();
    }
}

/// One flush loop shared by every dispatcher assigned to it.
pub(crate) struct Executor {
    id: usize,
    dispatchers: Mutex<HashMap<DispatcherId, Arc<DispatcherQueue>>>,
    running: AtomicBool,
    wake: Notify,
    shutdown: CancellationToken,
    batch_window: Duration,
    sustained_batch_window: Duration,
}

impl Executor {
    /// Creates an executor and spawns its flush loop.
    pub(crate) fn spawn(id: usize, config: &BatchConfig, shutdown: CancellationToken) -> Arc<Self> {
        let executor = Arc::new(Self {
            id,
            dispatchers: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            wake: Notify::new(),
            shutdown,
            batch_window: config.batch_window(),
            sustained_batch_window: config.sustained_batch_window(),
        });
        tokio::spawn(Arc::clone(&executor).run());
        executor
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn register(&self, queue: Arc<DispatcherQueue>) {
        self.dispatchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(queue.id(), queue);
    }

    pub(crate) fn deregister(&self, id: DispatcherId) {
        self.dispatchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    pub(crate) fn dispatcher_count(&self) -> usize {
        self.dispatchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Wakes the flush loop unless it is already running.
    pub(crate) fn may_start_running(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.wake.notify_one();
        }
    }

    /// Aborts every dispatcher and stops the flush loop.
    pub(crate) fn close(&self) {
        let queues: Vec<_> = self
            .dispatchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, queue)| queue)
            .collect();
        for queue in queues {
            queue.abort();
        }
        self.shutdown.cancel();
    }

    fn snapshot(&self) -> Vec<Arc<DispatcherQueue>> {
        self.dispatchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn has_pending(&self) -> bool {
        self.snapshot().iter().any(|queue| queue.has_pending())
    }

    fn flush_all(&self) -> usize {
        let mut flushed = 0;
        for queue in self.snapshot() {
            match queue.flush() {
                Ok(count) => flushed += count,
                Err(_) => self.deregister(queue.id()),
            }
        }
        flushed
    }

    async fn run(self: Arc<Self>) {
        debug!(executor = self.id, "executor started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.wake.notified() => {}
            }

            let mut window = self.batch_window;
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        debug!(executor = self.id, "executor stopped");
                        return;
                    }
                    _ = tokio::time::sleep(window) => {}
                }

                let flushed = self.flush_all();
                if flushed == 0 {
                    break;
                }
                trace!(executor = self.id, requests = flushed, "flushed dispatchers");
                window = self.sustained_batch_window;
            }

            self.running.store(false, Ordering::Release);
            // A dispatch may have lost the CAS just before the store above.
            if self.has_pending() {
                self.may_start_running();
            }
        }
        debug!(executor = self.id, "executor stopped");
    }
}
