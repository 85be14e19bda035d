//! Transaction client entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use txstream_core::{Result, TxStreamError};

use crate::config::ClientConfig;
use crate::connection::{self, spawn_framed, ConnectionId, RequestSink};
use crate::dispatch::RequestBatcher;
use crate::stream::ResponseListener;
use crate::transaction::TransactionStream;

/// Opens transaction streams that share one request batcher.
///
/// # Example
///
/// ```ignore
/// use txstream_client::{ClientConfig, TransactionClient};
/// use txstream_core::Request;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::builder()
///         .batch(|b| b.executor_count(2))
///         .build()?;
///
///     let client = TransactionClient::new(config);
///     let tx = client.connect("127.0.0.1:1729".parse()?).await?;
///     let payload = tx.execute(Request::from("ping")).await?;
///
///     tx.close();
///     client.shutdown();
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct TransactionClient {
    config: Arc<ClientConfig>,
    batcher: RequestBatcher,
}

impl TransactionClient {
    /// Creates a client and starts its executor pool.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(config: ClientConfig) -> Self {
        let batcher = RequestBatcher::new(config.batch());
        tracing::debug!(
            executors = batcher.executor_count(),
            window = ?config.batch().batch_window(),
            "transaction client started"
        );
        Self {
            config: Arc::new(config),
            batcher,
        }
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns true until [`shutdown`](Self::shutdown) is called.
    pub fn is_running(&self) -> bool {
        self.batcher.is_open()
    }

    /// Opens a transaction over an established byte stream.
    ///
    /// Dropping every handle to the returned stream sends its queued requests
    /// and completes the outbound half, as [`TransactionStream::close`] does.
    pub fn open_transaction<T>(&self, io: T) -> Result<TransactionStream>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        if !self.batcher.is_open() {
            return Err(TxStreamError::ClientClosed);
        }

        let id = ConnectionId::new();
        let listener = ResponseListener::spawn(self.config.collector_wait_timeout());
        let sink = spawn_framed(io, listener.clone(), id);
        let dispatcher = self
            .batcher
            .dispatcher_with_observer(sink, Arc::new(listener.clone()))?;
        Ok(TransactionStream::new(
            id,
            dispatcher,
            listener,
            self.config.response_timeout(),
        ))
    }

    /// Connects over TCP and opens a transaction on the new connection.
    pub async fn connect(&self, address: SocketAddr) -> Result<TransactionStream> {
        let stream = connection::connect(address, self.config.connection_timeout()).await?;
        self.open_transaction(stream)
    }

    /// Opens a transaction over a custom transport.
    ///
    /// Requests are written to `sink`. The returned listener is the inbound
    /// half: the transport must feed it every server payload through
    /// [`ResponseObserver`](crate::connection::ResponseObserver), in arrival
    /// order. A write rejected by `sink` fails every caller still waiting on
    /// the transaction with [`TxStreamError::Transport`].
    pub fn open_with_sink(
        &self,
        sink: Arc<dyn RequestSink>,
    ) -> Result<(TransactionStream, ResponseListener)> {
        let listener = ResponseListener::spawn(self.config.collector_wait_timeout());
        let dispatcher = self
            .batcher
            .dispatcher_with_observer(sink, Arc::new(listener.clone()))?;
        let stream = TransactionStream::new(
            ConnectionId::new(),
            dispatcher,
            listener.clone(),
            self.config.response_timeout(),
        );
        Ok((stream, listener))
    }

    /// Shuts the client down.
    ///
    /// Every open transaction's outbound stream is completed and its queued
    /// requests are dropped; further requests fail with
    /// [`TxStreamError::ClientClosed`].
    pub fn shutdown(&self) {
        tracing::info!(
            executors = self.batcher.executor_count(),
            "shutting down transaction client"
        );
        self.batcher.close();
    }
}
