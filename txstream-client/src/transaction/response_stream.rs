//! Lazily fetched multi-part results.

use std::sync::Arc;

use futures::Stream;
use tracing::trace;
use txstream_core::{Payload, Request, Result};

use super::TransactionStream;
use crate::stream::ResponseParts;

type Continuation = Arc<dyn Fn(u64) -> Request + Send + Sync>;

/// The data parts of a streamed result.
///
/// Control payloads are consumed, not yielded: a payload carrying an iterator
/// id makes the stream submit the continuation request for that id and keep
/// reading from its answer; a payload with the done flag ends the stream.
pub struct ResponseStream {
    stream: TransactionStream,
    parts: Option<ResponseParts>,
    continuation: Continuation,
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("stream", &self.stream)
            .field("finished", &self.parts.is_none())
            .finish()
    }
}

impl ResponseStream {
    pub(crate) fn new(
        stream: TransactionStream,
        parts: ResponseParts,
        continuation: Continuation,
    ) -> Self {
        Self {
            stream,
            parts: Some(parts),
            continuation,
        }
    }

    /// Returns the next data part, or `None` once the result is exhausted.
    ///
    /// An error ends the stream.
    pub async fn next(&mut self) -> Option<Result<Payload>> {
        loop {
            let parts = self.parts.as_mut()?;
            let Some(response) = parts.next().await else {
                self.parts = None;
                return None;
            };

            let payload = match response.ok() {
                Ok(payload) => payload,
                Err(e) => {
                    self.parts = None;
                    return Some(Err(e));
                }
            };

            if payload.is_done() {
                self.parts = None;
                return None;
            }

            if payload.has_continuation() {
                let iterator_id = payload.iterator_id();
                trace!(connection = %self.stream.id(), iterator_id, "continuing result");
                match self.stream.parts((self.continuation)(iterator_id)) {
                    Ok(next) => self.parts = Some(next),
                    Err(e) => {
                        self.parts = None;
                        return Some(Err(e));
                    }
                }
                continue;
            }

            return Some(Ok(payload));
        }
    }

    /// Reads the whole result.
    pub async fn collect(mut self) -> Result<Vec<Payload>> {
        let mut payloads = Vec::new();
        while let Some(payload) = self.next().await {
            payloads.push(payload?);
        }
        Ok(payloads)
    }

    /// Adapts this into a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<Payload>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|item| (item, stream))
        })
    }
}
