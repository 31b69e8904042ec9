//! Call-signal announcements.
//!
//! Call-control frames are routed like any other frame, and in addition the
//! relay tells everyone (sender and target included) what happened via a
//! system text frame. The target therefore hears about the event twice;
//! receivers treat the text as advisory only.

use relaychat_frame::{Frame, MessageType};

use crate::connection::Identity;

/// Status line for a call-control frame from `source` declaring `target`.
///
/// Returns `None` for every non-call-control type.
pub fn status_text(kind: MessageType, source: Identity, target: Identity) -> Option<String> {
    let text = match kind {
        MessageType::CallRequest => format!("📞 User {source} is calling User {target}"),
        MessageType::CallAccept => format!("✓ User {source} accepted call from User {target}"),
        MessageType::CallDecline => format!("✗ User {source} declined call from User {target}"),
        MessageType::CallEnd => format!("Call ended between User {source} and User {target}"),
        MessageType::GroupCallRequest => format!("📢 User {source} started a Group Call"),
        MessageType::Text
        | MessageType::Image
        | MessageType::Audio
        | MessageType::VoiceStreamChunk => return None,
    };
    Some(text)
}

/// The system frame to broadcast for a call-control frame, if any.
pub fn intercept(kind: MessageType, source: Identity, target: Identity) -> Option<Frame> {
    status_text(kind, source, target).map(|text| Frame::system_text(&text))
}
