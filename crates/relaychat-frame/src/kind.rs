//! Message types carried in the first header byte.
//!
//! Values are stable wire constants. Value 5 is reserved and never sent.

use crate::error::FrameError;

/// Routing id meaning "everyone" (client → server) or "system"
/// (server → client).
pub const BROADCAST: i32 = 0;

/// Sender id the relay uses for frames it synthesizes itself.
pub const SYSTEM: i32 = 0;

/// Kind of payload a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// UTF-8 text.
    Text = 1,
    /// A complete encoded still image (e.g. PNG).
    Image = 2,
    /// A recorded voice clip, raw 16 kHz mono PCM.
    Audio = 3,
    /// One chunk of a live call, raw 16 kHz mono PCM.
    VoiceStreamChunk = 4,
    CallRequest = 6,
    CallAccept = 7,
    CallDecline = 8,
    CallEnd = 9,
    GroupCallRequest = 10,
}

impl MessageType {
    /// Every message type, in wire-value order.
    pub const ALL: [MessageType; 9] = [
        MessageType::Text,
        MessageType::Image,
        MessageType::Audio,
        MessageType::VoiceStreamChunk,
        MessageType::CallRequest,
        MessageType::CallAccept,
        MessageType::CallDecline,
        MessageType::CallEnd,
        MessageType::GroupCallRequest,
    ];

    /// The wire value of this type.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable name for logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Text => "TEXT",
            MessageType::Image => "IMAGE",
            MessageType::Audio => "AUDIO",
            MessageType::VoiceStreamChunk => "VOICE_STREAM",
            MessageType::CallRequest => "CALL_REQUEST",
            MessageType::CallAccept => "CALL_ACCEPT",
            MessageType::CallDecline => "CALL_DECLINE",
            MessageType::CallEnd => "CALL_END",
            MessageType::GroupCallRequest => "GROUP_CALL_REQUEST",
        }
    }

    /// Returns true for call-signalling types. These carry an empty body and
    /// cause the relay to announce the event to everyone.
    pub fn is_call_control(self) -> bool {
        matches!(
            self,
            MessageType::CallRequest
                | MessageType::CallAccept
                | MessageType::CallDecline
                | MessageType::CallEnd
                | MessageType::GroupCallRequest
        )
    }
}

impl TryFrom<u8> for MessageType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Text),
            2 => Ok(MessageType::Image),
            3 => Ok(MessageType::Audio),
            4 => Ok(MessageType::VoiceStreamChunk),
            6 => Ok(MessageType::CallRequest),
            7 => Ok(MessageType::CallAccept),
            8 => Ok(MessageType::CallDecline),
            9 => Ok(MessageType::CallEnd),
            10 => Ok(MessageType::GroupCallRequest),
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> Self {
        kind.as_u8()
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
