//! Connection identity and TCP establishment.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::TcpStream;
use txstream_core::{Result, TxStreamError};

/// Unique identifier for a transaction stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a new unique connection ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opens a TCP connection with `TCP_NODELAY` set.
///
/// Batching already coalesces small writes, so Nagle's algorithm would only
/// add latency on top of the batch window.
pub async fn connect(address: SocketAddr, connect_timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(address))
        .await
        .map_err(|_| {
            TxStreamError::Timeout(format!(
                "connecting to {address} timed out after {connect_timeout:?}"
            ))
        })?
        .map_err(|e| TxStreamError::Connection(format!("failed to connect to {address}: {e}")))?;

    stream
        .set_nodelay(true)
        .map_err(|e| TxStreamError::Connection(format!("failed to set TCP_NODELAY: {e}")))?;

    tracing::debug!(address = %address, "established connection");
    Ok(stream)
}
