//! Request and payload units carried by a transaction stream.
//!
//! Both are opaque to the multiplexer. The only fields it ever reads are the
//! payload's iterator id and done flag, which decide when a multi-part
//! response is finished.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::constants::*;
use super::frame::Frame;
use crate::error::{Result, TxStreamError};

/// An opaque, immutable unit of work sent to the server.
///
/// Requests carry no correlation identifier: responses are matched to
/// requests purely by transmission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    body: Bytes,
}

impl Request {
    /// Creates a request from its encoded body.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    /// Returns the encoded body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consumes the request, returning its body.
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Returns the body length in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Returns true if the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

impl From<Bytes> for Request {
    fn from(body: Bytes) -> Self {
        Self::new(body)
    }
}

impl From<Vec<u8>> for Request {
    fn from(body: Vec<u8>) -> Self {
        Self::new(body)
    }
}

impl From<&'static str> for Request {
    fn from(body: &'static str) -> Self {
        Self::new(Bytes::from_static(body.as_bytes()))
    }
}

/// An ordered group of requests written to the network as one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestBatch {
    requests: Vec<Request>,
}

impl RequestBatch {
    /// Creates a batch from requests in transmission order.
    pub fn new(requests: Vec<Request>) -> Self {
        Self { requests }
    }

    /// Returns the number of requests in the batch.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns true if the batch holds no requests.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Returns the requests in transmission order.
    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Consumes the batch, returning its requests.
    pub fn into_requests(self) -> Vec<Request> {
        self.requests
    }

    /// Returns an iterator over the requests.
    pub fn iter(&self) -> std::slice::Iter<'_, Request> {
        self.requests.iter()
    }

    /// Returns the content size of this batch's frame.
    pub fn encoded_len(&self) -> usize {
        SIZE_OF_BATCH_COUNT_FIELD
            + self
                .requests
                .iter()
                .map(|r| SIZE_OF_REQUEST_LENGTH_FIELD + r.len())
                .sum::<usize>()
    }

    /// Encodes this batch as a single frame.
    pub fn to_frame(&self) -> Frame {
        let mut frame = Frame::with_capacity(self.encoded_len(), REQUEST_BATCH_FLAG);
        frame.content.put_u32_le(self.requests.len() as u32);
        for request in &self.requests {
            frame.content.put_u32_le(request.len() as u32);
            frame.content.put_slice(request.body());
        }
        frame
    }

    /// Decodes a batch from a frame.
    pub fn from_frame(frame: Frame) -> Result<Self> {
        if !frame.is_request_batch() {
            return Err(TxStreamError::Protocol(format!(
                "expected request batch frame, got flags {:#06x}",
                frame.flags
            )));
        }

        let mut content = frame.content;
        if content.len() < SIZE_OF_BATCH_COUNT_FIELD {
            return Err(TxStreamError::Protocol(
                "request batch frame is missing its count".to_string(),
            ));
        }
        let count = content.get_u32_le() as usize;

        let mut requests = Vec::with_capacity(count.min(content.len() / SIZE_OF_REQUEST_LENGTH_FIELD));
        for index in 0..count {
            if content.len() < SIZE_OF_REQUEST_LENGTH_FIELD {
                return Err(TxStreamError::Protocol(format!(
                    "request {index} of {count} is missing its length"
                )));
            }
            let length = content.get_u32_le() as usize;
            if content.len() < length {
                return Err(TxStreamError::Protocol(format!(
                    "request {index} declares {length} bytes but only {} remain",
                    content.len()
                )));
            }
            requests.push(Request::new(content.split_to(length).freeze()));
        }

        if !content.is_empty() {
            return Err(TxStreamError::Protocol(format!(
                "{} trailing bytes after {count} requests",
                content.len()
            )));
        }

        Ok(Self { requests })
    }
}

impl From<Vec<Request>> for RequestBatch {
    fn from(requests: Vec<Request>) -> Self {
        Self::new(requests)
    }
}

impl IntoIterator for RequestBatch {
    type Item = Request;
    type IntoIter = std::vec::IntoIter<Request>;

    fn into_iter(self) -> Self::IntoIter {
        self.requests.into_iter()
    }
}

/// One server reply, possibly one part of a streamed result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    body: Bytes,
    iterator_id: u64,
    done: bool,
}

impl Payload {
    /// Creates a payload with no continuation and no done marker.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            iterator_id: INITIAL_ITERATOR_ID,
            done: false,
        }
    }

    /// Creates an empty payload that marks the end of a streamed result.
    pub fn done_marker() -> Self {
        Self::new(Bytes::new()).with_done(true)
    }

    /// Creates an empty payload telling the client to continue the cursor
    /// identified by `iterator_id` with a new request.
    pub fn continuation(iterator_id: u64) -> Self {
        Self::new(Bytes::new()).with_iterator_id(iterator_id)
    }

    /// Sets the iterator id.
    pub fn with_iterator_id(mut self, iterator_id: u64) -> Self {
        self.iterator_id = iterator_id;
        self
    }

    /// Sets the done flag.
    pub fn with_done(mut self, done: bool) -> Self {
        self.done = done;
        self
    }

    /// Returns the encoded body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consumes the payload, returning its body.
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Returns the iterator id, `INITIAL_ITERATOR_ID` when absent.
    pub fn iterator_id(&self) -> u64 {
        self.iterator_id
    }

    /// Returns true if the server marked this as the last part.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Returns true if the payload carries a continuation cursor.
    pub fn has_continuation(&self) -> bool {
        self.iterator_id != INITIAL_ITERATOR_ID
    }

    /// Returns true if no further parts for the current request will follow.
    ///
    /// A continuation id ends the current request as well: the remaining parts
    /// of that cursor are answers to a new request.
    pub fn ends_part_sequence(&self) -> bool {
        self.done || self.has_continuation()
    }

    /// Encodes this payload as a single frame.
    pub fn to_frame(&self) -> Frame {
        let mut flags = RESPONSE_FLAG;
        if self.done {
            flags |= DONE_FLAG;
        }
        let mut frame = Frame::with_capacity(SIZE_OF_ITERATOR_ID_FIELD + self.body.len(), flags);
        frame.content.put_u64_le(self.iterator_id);
        frame.content.put_slice(&self.body);
        frame
    }

    /// Decodes a payload from a frame.
    pub fn from_frame(frame: Frame) -> Result<Self> {
        if !frame.is_response() {
            return Err(TxStreamError::Protocol(format!(
                "expected response frame, got flags {:#06x}",
                frame.flags
            )));
        }
        let done = frame.is_done();

        let mut content: BytesMut = frame.content;
        if content.len() < SIZE_OF_ITERATOR_ID_FIELD {
            return Err(TxStreamError::Protocol(
                "response frame is missing its iterator id".to_string(),
            ));
        }
        let iterator_id = content.get_u64_le();

        Ok(Self {
            body: content.freeze(),
            iterator_id,
            done,
        })
    }
}
