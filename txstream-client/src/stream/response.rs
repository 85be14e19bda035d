//! Tri-state result of one inbound stream event.

use txstream_core::{ErrorCause, Payload, Result, TxStreamError};

/// The kind of a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    /// A server payload.
    Ok,
    /// The stream failed.
    Error,
    /// The server completed the stream.
    Completed,
}

/// What a collector receives from the response listener.
///
/// `Error` and `Completed` are connection-level outcomes: once either is seen
/// the stream is over for every pending collector.
#[derive(Debug, Clone)]
pub enum Response {
    /// A server payload answering the collector's request.
    Ok(Payload),
    /// The inbound stream failed with the given cause.
    Error(ErrorCause),
    /// The inbound stream ended before this collector was satisfied.
    Completed,
}

impl Response {
    /// Returns the kind of this response.
    pub fn response_type(&self) -> ResponseType {
        match self {
            Response::Ok(_) => ResponseType::Ok,
            Response::Error(_) => ResponseType::Error,
            Response::Completed => ResponseType::Completed,
        }
    }

    /// Returns true for an `Ok` response.
    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_))
    }

    /// Unwraps the payload.
    ///
    /// # Errors
    ///
    /// `Error` becomes [`TxStreamError::Transport`] carrying the original
    /// cause; `Completed` becomes [`TxStreamError::StreamInterrupted`].
    pub fn ok(self) -> Result<Payload> {
        match self {
            Response::Ok(payload) => Ok(payload),
            Response::Error(cause) => Err(TxStreamError::Transport(cause)),
            Response::Completed => Err(TxStreamError::StreamInterrupted),
        }
    }

    /// Returns the payload of an `Ok` response.
    pub fn as_ok(&self) -> Option<&Payload> {
        match self {
            Response::Ok(payload) => Some(payload),
            _ => None,
        }
    }

    /// Returns the cause of an `Error` response.
    pub fn error(&self) -> Option<&ErrorCause> {
        match self {
            Response::Error(cause) => Some(cause),
            _ => None,
        }
    }
}

impl From<Payload> for Response {
    fn from(payload: Payload) -> Self {
        Response::Ok(payload)
    }
}
