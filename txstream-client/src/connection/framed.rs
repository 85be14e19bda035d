//! Binds a byte stream to the multiplexer using the wire codec.
//!
//! A writer task drains a channel of request batches into the encoder, one
//! frame per batch. A reader task decodes payloads and forwards them to a
//! [`ResponseObserver`]. Read-side EOF completes the observer; any I/O or
//! decode failure on either side is reported through `on_error`.

use std::sync::{Arc, Mutex, PoisonError};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace, warn};
use txstream_core::protocol::ClientCodec;
use txstream_core::{RequestBatch, Result, TxStreamError};

use super::connection::ConnectionId;
use super::transport::{RequestSink, ResponseObserver};

/// [`RequestSink`] feeding the writer task of a framed connection.
#[derive(Debug)]
pub struct ChannelSink {
    id: ConnectionId,
    tx: Mutex<Option<mpsc::UnboundedSender<RequestBatch>>>,
}

impl ChannelSink {
    /// Creates a sink and the receiving end its batches arrive on.
    pub fn new(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<RequestBatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id,
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Returns the connection this sink writes to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns true once the sink has been completed or its writer has exited.
    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(true, |tx| tx.is_closed())
    }
}

impl RequestSink for ChannelSink {
    fn send(&self, batch: RequestBatch) -> Result<()> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard
            .as_ref()
            .ok_or_else(|| TxStreamError::Connection("request stream closed".to_string()))?;
        tx.send(batch)
            .map_err(|_| TxStreamError::Connection(format!("writer for {} has exited", self.id)))
    }

    fn complete(&self) {
        if self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            debug!(connection = %self.id, "request stream completed");
        }
    }
}

/// Spawns the reader and writer tasks for `io` and returns the sink that
/// feeds the writer.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
pub fn spawn_framed<T, O>(io: T, observer: O, id: ConnectionId) -> Arc<ChannelSink>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
    O: ResponseObserver + 'static,
{
    let observer = Arc::new(observer);
    let (read_half, write_half) = tokio::io::split(io);
    let (sink, mut rx) = ChannelSink::new(id);

    let write_observer = Arc::clone(&observer);
    tokio::spawn(async move {
        let mut writer = FramedWrite::new(write_half, ClientCodec::new());
        while let Some(batch) = rx.recv().await {
            trace!(connection = %id, requests = batch.len(), "writing batch");
            if let Err(e) = writer.send(batch).await {
                warn!(connection = %id, error = %e, "failed to write request batch");
                write_observer.on_error(Arc::new(e));
                return;
            }
        }
        if let Err(e) = writer.close().await {
            debug!(connection = %id, error = %e, "failed to shut down write half");
        }
        debug!(connection = %id, "writer stopped");
    });

    tokio::spawn(async move {
        let mut reader = FramedRead::new(read_half, ClientCodec::new());
        loop {
            match reader.next().await {
                Some(Ok(payload)) => observer.on_next(payload),
                Some(Err(e)) => {
                    warn!(connection = %id, error = %e, "inbound stream failed");
                    observer.on_error(Arc::new(e));
                    break;
                }
                None => {
                    debug!(connection = %id, "inbound stream completed");
                    observer.on_completed();
                    break;
                }
            }
        }
    });

    Arc::new(sink)
}
