//! Error types for transaction stream operations.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// The underlying cause of a transport-level failure.
///
/// Causes are shared because a single stream failure is delivered to every
/// request that was still waiting on that stream.
pub type ErrorCause = Arc<dyn std::error::Error + Send + Sync>;

/// The main error type for transaction stream operations.
#[derive(Debug, Error)]
pub enum TxStreamError {
    /// A request was dispatched after the batcher or dispatcher was closed.
    #[error("client closed: no further requests can be dispatched")]
    ClientClosed,

    /// A response collector was registered after the response listener saw a
    /// terminal stream event.
    #[error("response listener terminated: the transaction stream no longer accepts requests")]
    ListenerTerminated,

    /// The inbound stream failed; every pending request receives the same cause.
    #[error("transport error: {0}")]
    Transport(#[source] ErrorCause),

    /// The inbound stream completed while requests were still outstanding.
    #[error("transaction stream interrupted: all running requests have been stopped")]
    StreamInterrupted,

    /// A response arrived with no registered collector to receive it.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Connection-related errors (connect failures, closed request streams).
    #[error("connection error: {0}")]
    Connection(String),

    /// Malformed frames on the wire.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A bounded wait elapsed.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// Configuration errors (invalid settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TxStreamError {
    /// Wraps an arbitrary error as a transport failure cause.
    pub fn transport<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Arc::new(cause))
    }

    /// Returns true if this error is terminal for the whole stream rather than
    /// for a single call.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ClientClosed
                | Self::ListenerTerminated
                | Self::Transport(_)
                | Self::StreamInterrupted
                | Self::ProtocolViolation(_)
        )
    }
}

/// A specialized `Result` type for transaction stream operations.
pub type Result<T> = std::result::Result<T, TxStreamError>;
