//! Codecs for the two directions of a transaction stream.
//!
//! [`ClientCodec`] writes request batches and reads server payloads;
//! [`ServerCodec`] is its mirror image, used by servers and test peers.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::constants::*;
use super::frame::Frame;
use super::message::{Payload, RequestBatch};
use crate::error::{Result, TxStreamError};

fn decode_frame(src: &mut BytesMut) -> Result<Option<Frame>> {
    let Some(frame_length) = Frame::peek_length(&src[..]) else {
        return Ok(None);
    };

    if frame_length < SIZE_OF_FRAME_FLAGS_FIELD {
        return Err(TxStreamError::Protocol(format!(
            "frame length {frame_length} is shorter than the flags field"
        )));
    }
    if frame_length > MAX_FRAME_SIZE {
        return Err(TxStreamError::Protocol(format!(
            "frame length {frame_length} exceeds maximum of {MAX_FRAME_SIZE}"
        )));
    }

    let total_frame_size = SIZE_OF_FRAME_LENGTH_FIELD + frame_length;
    if src.len() < total_frame_size {
        src.reserve(total_frame_size - src.len());
        return Ok(None);
    }

    Frame::read_from(src)
        .map(Some)
        .ok_or_else(|| TxStreamError::Protocol("failed to read frame".to_string()))
}

fn check_outgoing(frame: &Frame) -> Result<()> {
    if frame.frame_length() > MAX_FRAME_SIZE {
        return Err(TxStreamError::Protocol(format!(
            "frame length {} exceeds maximum of {MAX_FRAME_SIZE}",
            frame.frame_length()
        )));
    }
    Ok(())
}

/// Client side codec: encodes [`RequestBatch`]es, decodes [`Payload`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientCodec;

impl ClientCodec {
    /// Creates a new codec instance.
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<RequestBatch> for ClientCodec {
    type Error = TxStreamError;

    fn encode(&mut self, item: RequestBatch, dst: &mut BytesMut) -> Result<()> {
        if item.is_empty() {
            return Err(TxStreamError::Protocol(
                "cannot encode empty request batch".to_string(),
            ));
        }

        let frame = item.to_frame();
        check_outgoing(&frame)?;
        frame.write_to(dst);
        Ok(())
    }
}

impl Decoder for ClientCodec {
    type Item = Payload;
    type Error = TxStreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match decode_frame(src)? {
            Some(frame) => Payload::from_frame(frame).map(Some),
            None => Ok(None),
        }
    }
}

/// Server side codec: decodes [`RequestBatch`]es, encodes [`Payload`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerCodec;

impl ServerCodec {
    /// Creates a new codec instance.
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<Payload> for ServerCodec {
    type Error = TxStreamError;

    fn encode(&mut self, item: Payload, dst: &mut BytesMut) -> Result<()> {
        let frame = item.to_frame();
        check_outgoing(&frame)?;
        frame.write_to(dst);
        Ok(())
    }
}

impl Decoder for ServerCodec {
    type Item = RequestBatch;
    type Error = TxStreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match decode_frame(src)? {
            Some(frame) => RequestBatch::from_frame(frame).map(Some),
            None => Ok(None),
        }
    }
}
