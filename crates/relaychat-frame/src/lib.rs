//! Length-prefixed binary framing for the relaychat protocol.
//!
//! Every message is framed with a 9-byte big-endian header:
//! - 1 byte message type
//! - 4-byte signed routing id (target on the way in, sender on the way out)
//! - 4-byte signed body length
//!
//! No escaping and no resynchronization: the length prefix alone defines
//! frame boundaries, so a malformed header ends the stream.

pub mod codec;
pub mod error;
pub mod kind;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_BODY, HEADER_SIZE, MAX_WIRE_BODY,
};
pub use error::{FrameError, Result};
pub use kind::{MessageType, BROADCAST, SYSTEM};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use async_codec::RelayCodec;
