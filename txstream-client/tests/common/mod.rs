//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio_util::codec::Framed;
use txstream_client::{
    ClientConfig, ClientConfigBuilder, Payload, Request, RequestBatch, RequestSink, Result,
    TransactionClient, TxStreamError,
};
use txstream_core::protocol::ServerCodec;

/// Sink that records every batch it is handed.
#[derive(Debug, Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<RequestBatch>>,
    completed: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of network writes so far.
    pub fn sends(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(RequestBatch::len).collect()
    }

    /// Every request written so far, in transmission order.
    pub fn requests(&self) -> Vec<Request> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|batch| batch.requests().to_vec())
            .collect()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }
}

impl RequestSink for RecordingSink {
    fn send(&self, batch: RequestBatch) -> Result<()> {
        self.batches.lock().unwrap().push(batch);
        Ok(())
    }

    fn complete(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }
}

/// Sink whose first `failures` writes are rejected; later writes are
/// recorded like [`RecordingSink`].
#[derive(Debug, Default)]
pub struct FailingSink {
    failures: AtomicUsize,
    recorded: RecordingSink,
}

impl FailingSink {
    pub fn failing_once() -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(1),
            recorded: RecordingSink::default(),
        })
    }

    pub fn requests(&self) -> Vec<Request> {
        self.recorded.requests()
    }

    pub fn is_completed(&self) -> bool {
        self.recorded.is_completed()
    }
}

impl RequestSink for FailingSink {
    fn send(&self, batch: RequestBatch) -> Result<()> {
        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(TxStreamError::Connection("broken pipe".into()));
        }
        self.recorded.send(batch)
    }

    fn complete(&self) {
        self.recorded.complete();
    }
}

pub fn request(body: impl Into<String>) -> Request {
    Request::new(body.into().into_bytes())
}

pub fn body(payload: &Payload) -> String {
    String::from_utf8(payload.body().to_vec()).unwrap()
}

pub fn config_with_executors(executors: usize) -> ClientConfig {
    ClientConfigBuilder::new()
        .executor_count(executors)
        .build()
        .expect("failed to build config")
}

pub fn client(executors: usize) -> TransactionClient {
    TransactionClient::new(config_with_executors(executors))
}

/// Serves one connection, answering each request with the payloads
/// `handler` returns, in order. Returns when the client completes its
/// outbound stream.
pub fn spawn_server<T, F>(io: T, handler: F) -> tokio::task::JoinHandle<usize>
where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    F: Fn(&Request) -> Vec<Payload> + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = Framed::new(io, ServerCodec::new());
        let mut served = 0;
        while let Some(Ok(batch)) = framed.next().await {
            for request in batch.iter() {
                for payload in handler(request) {
                    if framed.send(payload).await.is_err() {
                        return served;
                    }
                }
                served += 1;
            }
        }
        served
    })
}

/// Answers every request with a payload carrying the same body.
pub fn echo(request: &Request) -> Vec<Payload> {
    vec![Payload::new(request.body().clone())]
}

/// Connected in-memory client/server pair.
pub fn duplex() -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(64 * 1024)
}

pub const WAIT: Duration = Duration::from_secs(10);
