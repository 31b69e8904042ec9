/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The type byte does not name a known message type.
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    /// The header declares a negative body length.
    #[error("negative body length ({0})")]
    NegativeLength(i32),

    /// The body exceeds the configured maximum size.
    #[error("body too large ({size} bytes, max {max})")]
    BodyTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// True for malformed input from the peer. The stream cannot be
    /// resynchronized after one of these.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            FrameError::UnknownMessageType(_)
                | FrameError::NegativeLength(_)
                | FrameError::BodyTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
