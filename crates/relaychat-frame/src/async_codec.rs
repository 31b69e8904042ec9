//! `tokio_util::codec` adapter over the same wire format.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, Frame, DEFAULT_MAX_BODY};
use crate::error::FrameError;

/// Frame codec for `tokio_util::codec::Framed` and friends.
#[derive(Debug, Clone)]
pub struct RelayCodec {
    max_body_size: usize,
}

impl RelayCodec {
    /// Codec with the default body limit.
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY)
    }

    /// Codec with an explicit body limit.
    pub fn with_max_body(max_body_size: usize) -> Self {
        Self { max_body_size }
    }
}

impl Default for RelayCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RelayCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, self.max_body_size)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Frame> for RelayCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.body.len() > self.max_body_size {
            return Err(FrameError::BodyTooLarge {
                size: item.body.len(),
                max: self.max_body_size,
            });
        }
        encode_frame(item.kind, item.routing_id, &item.body, dst)
    }
}
