use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::{MessageType, SYSTEM};

/// Frame header: type (1) + routing id (4) + length (4) = 9 bytes.
pub const HEADER_SIZE: usize = 9;

/// Largest body the length field can describe.
pub const MAX_WIRE_BODY: usize = i32::MAX as usize;

/// Default maximum body size accepted by readers: 64 MiB.
///
/// The wire format allows any non-negative `i32` length; this cap is a local
/// limit. A larger declared length is rejected as a protocol error, so peers
/// that send bigger media need [`FrameConfig::max_body_size`] raised, up to
/// [`MAX_WIRE_BODY`].
pub const DEFAULT_MAX_BODY: usize = 64 * 1024 * 1024;

/// Most buffer space reserved ahead of body bytes actually arriving.
const MAX_BODY_RESERVE: usize = 1024 * 1024;

/// One protocol message.
///
/// `routing_id` is the target identity on frames a client sends and the
/// sender identity on frames the relay delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// What the body contains.
    pub kind: MessageType,
    /// Target (client → relay) or sender (relay → client).
    pub routing_id: i32,
    /// Opaque payload.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(kind: MessageType, routing_id: i32, body: impl Into<Bytes>) -> Self {
        Self {
            kind,
            routing_id,
            body: body.into(),
        }
    }

    /// A UTF-8 text frame.
    pub fn text(routing_id: i32, text: &str) -> Self {
        Self::new(
            MessageType::Text,
            routing_id,
            Bytes::copy_from_slice(text.as_bytes()),
        )
    }

    /// A text frame from the relay itself (sender id 0).
    pub fn system_text(text: &str) -> Self {
        Self::text(SYSTEM, text)
    }

    /// A call-signalling frame. These always have an empty body.
    pub fn signal(kind: MessageType, routing_id: i32) -> Self {
        Self::new(kind, routing_id, Bytes::new())
    }

    /// The same frame with its routing id replaced.
    pub fn with_routing_id(mut self, routing_id: i32) -> Self {
        self.routing_id = routing_id;
        self
    }

    /// The body as text, if it is valid UTF-8.
    pub fn body_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// True when the relay itself produced this frame.
    pub fn is_system(&self) -> bool {
        self.routing_id == SYSTEM
    }

    /// The total wire size of this frame (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌───────────┬──────────────┬──────────────┬─────────────────┐
/// │ Type (1B) │ Routing id   │ Length       │ Body            │
/// │           │ (4B, i32)    │ (4B, i32)    │ (Length bytes)  │
/// └───────────┴──────────────┴──────────────┴─────────────────┘
/// ```
pub fn encode_frame(
    kind: MessageType,
    routing_id: i32,
    body: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if body.len() > MAX_WIRE_BODY {
        return Err(FrameError::BodyTooLarge {
            size: body.len(),
            max: MAX_WIRE_BODY,
        });
    }
    dst.reserve(HEADER_SIZE + body.len());
    dst.put_u8(kind.as_u8());
    dst.put_i32(routing_id);
    dst.put_i32(body.len() as i32);
    dst.put_slice(body);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. Header errors are
/// reported as soon as the full header is buffered, before any body bytes
/// arrive.
pub fn decode_frame(src: &mut BytesMut, max_body: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let kind = MessageType::try_from(src[0])?;
    let routing_id = i32::from_be_bytes([src[1], src[2], src[3], src[4]]);
    let length = i32::from_be_bytes([src[5], src[6], src[7], src[8]]);

    if length < 0 {
        return Err(FrameError::NegativeLength(length));
    }
    let body_len = length as usize;
    if body_len > max_body {
        return Err(FrameError::BodyTooLarge {
            size: body_len,
            max: max_body,
        });
    }

    let total = HEADER_SIZE + body_len;
    if src.len() < total {
        src.reserve((total - src.len()).min(MAX_BODY_RESERVE));
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let body = src.split_to(body_len).freeze();

    Ok(Some(Frame {
        kind,
        routing_id,
        body,
    }))
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: [`DEFAULT_MAX_BODY`] (64 MiB),
    /// below the [`MAX_WIRE_BODY`] the length field can carry.
    pub max_body_size: usize,
    /// Read timeout for blocking operations. Default: none.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations. Default: none.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
