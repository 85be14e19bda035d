//! Demultiplexer routing inbound responses to registered collectors.
//!
//! Responses carry no correlation id. The listener relies on one invariant:
//! collectors are registered in exactly the order their requests are
//! transmitted, so the Nth collector owns the responses to the Nth request.
//!
//! All queue and active-slot state is owned by a single actor task. Handles
//! talk to it over an unbounded channel, which keeps [`add_collector`] and the
//! [`ResponseObserver`] callbacks non-blocking.
//!
//! [`add_collector`]: ResponseListener::add_collector

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, trace, warn};
use txstream_core::{ErrorCause, Payload, Result, TxStreamError};

use super::collector::ResponseCollector;
use super::response::Response;
use crate::connection::ResponseObserver;

enum ListenerMessage {
    Register(Box<dyn ResponseCollector>),
    Next(Payload),
    Error(ErrorCause),
    Completed,
}

/// Handle to a response listener.
///
/// Cloning the handle shares the same listener. The actor task exits once
/// every handle has been dropped, completing any collector still waiting.
#[derive(Clone)]
pub struct ResponseListener {
    tx: mpsc::UnboundedSender<ListenerMessage>,
    terminated: Arc<AtomicBool>,
}

impl std::fmt::Debug for ResponseListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseListener")
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl ResponseListener {
    /// Starts a listener.
    ///
    /// `collector_wait_timeout` bounds how long a payload that arrives with no
    /// collector registered waits for one before the listener declares a
    /// protocol violation.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(collector_wait_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let terminated = Arc::new(AtomicBool::new(false));

        let actor = ListenerActor {
            rx,
            active: None,
            pending: VecDeque::new(),
            terminal: None,
            terminated: Arc::clone(&terminated),
            collector_wait_timeout,
        };
        tokio::spawn(actor.run());

        Self { tx, terminated }
    }

    /// Registers a collector for the next request to be transmitted.
    ///
    /// # Errors
    ///
    /// Returns [`TxStreamError::ListenerTerminated`] once the stream has
    /// failed or completed.
    pub fn add_collector<C: ResponseCollector>(&self, collector: C) -> Result<()> {
        if self.is_terminated() {
            return Err(TxStreamError::ListenerTerminated);
        }
        self.tx
            .send(ListenerMessage::Register(Box::new(collector)))
            .map_err(|_| TxStreamError::ListenerTerminated)
    }

    /// Returns true once the listener no longer accepts collectors.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Terminates the listener with `error`, failing every pending collector.
    pub fn terminate(&self, error: TxStreamError) {
        self.on_error(Arc::new(error));
    }

    fn post(&self, message: ListenerMessage) {
        // A closed channel means the actor already finished its drain.
        let _ = self.tx.send(message);
    }
}

impl ResponseObserver for ResponseListener {
    fn on_next(&self, payload: Payload) {
        self.post(ListenerMessage::Next(payload));
    }

    fn on_error(&self, cause: ErrorCause) {
        self.terminated.store(true, Ordering::Release);
        self.post(ListenerMessage::Error(cause));
    }

    fn on_completed(&self) {
        self.terminated.store(true, Ordering::Release);
        self.post(ListenerMessage::Completed);
    }
}

struct ListenerActor {
    rx: mpsc::UnboundedReceiver<ListenerMessage>,
    active: Option<Box<dyn ResponseCollector>>,
    pending: VecDeque<Box<dyn ResponseCollector>>,
    terminal: Option<Response>,
    terminated: Arc<AtomicBool>,
    collector_wait_timeout: Duration,
}

impl ListenerActor {
    async fn run(mut self) {
        while let Some(message) = self.rx.recv().await {
            self.handle(message).await;
        }
        self.terminate(Response::Completed);
        debug!("response listener stopped");
    }

    async fn handle(&mut self, message: ListenerMessage) {
        match message {
            ListenerMessage::Register(collector) => self.register(collector),
            ListenerMessage::Next(payload) => self.route(payload).await,
            ListenerMessage::Error(cause) => self.terminate(Response::Error(cause)),
            ListenerMessage::Completed => self.terminate(Response::Completed),
        }
    }

    fn register(&mut self, mut collector: Box<dyn ResponseCollector>) {
        match &self.terminal {
            // Lost the race with termination: fail it like every other
            // collector that was still waiting.
            Some(terminal) => {
                collector.on_response(terminal.clone());
            }
            None => self.pending.push_back(collector),
        }
    }

    async fn route(&mut self, payload: Payload) {
        if self.terminal.is_some() {
            warn!(
                bytes = payload.body().len(),
                "discarding response received after listener termination"
            );
            return;
        }

        if self.active.is_none() {
            self.active = match self.pending.pop_front() {
                Some(collector) => Some(collector),
                None => self.await_collector().await,
            };
        }

        let Some(active) = self.active.as_mut() else {
            return;
        };
        let done = active.on_response(Response::Ok(payload));
        trace!(done, pending = self.pending.len(), "routed response");
        if done {
            self.active = None;
        }
    }

    /// Waits for a registration after a payload arrived with nobody to take it.
    async fn await_collector(&mut self) -> Option<Box<dyn ResponseCollector>> {
        let deadline = Instant::now() + self.collector_wait_timeout;
        match timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(ListenerMessage::Register(collector))) => Some(collector),
            Ok(Some(ListenerMessage::Error(cause))) => {
                self.terminate(Response::Error(cause));
                None
            }
            Ok(Some(ListenerMessage::Completed)) | Ok(None) => {
                self.protocol_violation("stream ended with an unclaimed response");
                None
            }
            Ok(Some(ListenerMessage::Next(_))) => {
                self.protocol_violation("received responses with no request outstanding");
                None
            }
            Err(_) => {
                self.protocol_violation("unexpected response with no collector registered");
                None
            }
        }
    }

    fn protocol_violation(&mut self, message: &str) {
        error!(
            wait = ?self.collector_wait_timeout,
            "protocol violation: {message}"
        );
        let cause: ErrorCause = Arc::new(TxStreamError::ProtocolViolation(message.to_string()));
        self.terminate(Response::Error(cause));
    }

    /// Feeds `terminal` once to the active and every pending collector.
    fn terminate(&mut self, terminal: Response) {
        if self.terminal.is_some() {
            return;
        }
        self.terminated.store(true, Ordering::Release);

        let mut drained = 0usize;
        if let Some(mut active) = self.active.take() {
            active.on_response(terminal.clone());
            drained += 1;
        }
        while let Some(mut collector) = self.pending.pop_front() {
            collector.on_response(terminal.clone());
            drained += 1;
        }

        debug!(
            outcome = ?terminal.response_type(),
            collectors = drained,
            "response listener terminated"
        );
        self.terminal = Some(terminal);
    }
}
