//! Per-request response collectors and the handles callers wait on.
//!
//! A collector is created when a request is submitted, registered with the
//! [`ResponseListener`](super::ResponseListener) before the request is
//! transmitted, and fed every response for that request. The listener moves on
//! to the next collector once [`ResponseCollector::on_response`] reports done.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use txstream_core::{Payload, Result, TxStreamError};

use super::response::Response;

/// Receives the responses belonging to one request.
pub trait ResponseCollector: Send + 'static {
    /// Feeds one response and returns true once no further responses belong
    /// to this collector. Must not block.
    fn on_response(&mut self, response: Response) -> bool;
}

/// Collector for requests answered by exactly one response.
#[derive(Debug)]
pub struct SingleResponseCollector {
    tx: Option<oneshot::Sender<Response>>,
}

impl SingleResponseCollector {
    /// Creates a collector and the handle its result is awaited on.
    pub fn new() -> (Self, SingleResponse) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, SingleResponse { rx })
    }
}

impl ResponseCollector for SingleResponseCollector {
    fn on_response(&mut self, response: Response) -> bool {
        if let Some(tx) = self.tx.take() {
            // The caller may have given up waiting; the result is discarded.
            let _ = tx.send(response);
        }
        true
    }
}

/// Handle to the result of a [`SingleResponseCollector`].
#[derive(Debug)]
pub struct SingleResponse {
    rx: oneshot::Receiver<Response>,
}

impl SingleResponse {
    /// Waits for the response.
    ///
    /// A collector dropped without ever being fed yields
    /// [`Response::Completed`].
    pub async fn get(self) -> Response {
        self.rx.await.unwrap_or(Response::Completed)
    }

    /// Waits for the response for at most `timeout`.
    ///
    /// On timeout the collector stays registered and is still fed in order;
    /// its result is discarded.
    pub async fn get_timeout(self, timeout: Duration) -> Result<Response> {
        tokio::time::timeout(timeout, self.get())
            .await
            .map_err(|_| TxStreamError::Timeout(format!("no response within {timeout:?}")))
    }

    /// Waits for the response and unwraps its payload.
    pub async fn payload(self) -> Result<Payload> {
        self.get().await.ok()
    }

    /// Returns the response if it has already arrived.
    pub fn try_get(&mut self) -> Option<Response> {
        match self.rx.try_recv() {
            Ok(response) => Some(response),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Response::Completed),
        }
    }
}

/// Collector for requests answered by a sequence of parts.
///
/// Parts are buffered in arrival order until a payload marks the end of the
/// sequence (the done flag, or a non-zero iterator id asking for a follow-up
/// request). An `Error` or `Completed` response also ends the sequence.
#[derive(Debug)]
pub struct MultiResponseCollector {
    tx: Option<mpsc::UnboundedSender<Response>>,
}

impl MultiResponseCollector {
    /// Creates a collector and the handle its parts are read from.
    pub fn new() -> (Self, ResponseParts) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self { tx: Some(tx) },
            ResponseParts {
                rx,
                finished: false,
            },
        )
    }

    /// Returns true once the final part has been received.
    pub fn is_done(&self) -> bool {
        self.tx.is_none()
    }
}

impl ResponseCollector for MultiResponseCollector {
    fn on_response(&mut self, response: Response) -> bool {
        let done = match &response {
            Response::Ok(payload) => payload.ends_part_sequence(),
            Response::Error(_) | Response::Completed => true,
        };

        if let Some(tx) = &self.tx {
            let _ = tx.send(response);
        }
        if done {
            // Dropping the sender lets the reader observe the end of the parts.
            self.tx = None;
        }
        done
    }
}

/// Handle to the parts of a [`MultiResponseCollector`].
#[derive(Debug)]
pub struct ResponseParts {
    rx: mpsc::UnboundedReceiver<Response>,
    finished: bool,
}

impl ResponseParts {
    /// Returns the next part, or `None` after the last one has been taken.
    ///
    /// A collector dropped before its sequence ended yields a final
    /// [`Response::Completed`].
    pub async fn next(&mut self) -> Option<Response> {
        if self.finished {
            return None;
        }
        let response = self.rx.recv().await.unwrap_or(Response::Completed);
        self.finished = match &response {
            Response::Ok(payload) => payload.ends_part_sequence(),
            _ => true,
        };
        Some(response)
    }

    /// Like [`next`](Self::next), bounded by `timeout`.
    pub async fn next_timeout(&mut self, timeout: Duration) -> Result<Option<Response>> {
        tokio::time::timeout(timeout, self.next())
            .await
            .map_err(|_| TxStreamError::Timeout(format!("no response part within {timeout:?}")))
    }

    /// Returns true once the final part has been taken.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Waits for the whole sequence and returns every payload in order,
    /// including the one that ended it.
    ///
    /// # Errors
    ///
    /// Fails if the sequence ended with an `Error` or `Completed` response.
    pub async fn collect(mut self) -> Result<Vec<Payload>> {
        let mut payloads = Vec::new();
        while let Some(response) = self.next().await {
            payloads.push(response.ok()?);
        }
        Ok(payloads)
    }
}
