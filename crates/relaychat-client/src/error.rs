use crate::call::CallState;

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] relaychat_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] relaychat_frame::FrameError),

    /// The relay closed the connection.
    #[error("disconnected from relay")]
    Disconnected,

    /// A local call action was attempted in a state that does not allow it.
    #[error("cannot {action} while {state}")]
    InvalidCallState {
        action: &'static str,
        state: CallState,
    },

    /// Direct calls need a positive peer identity.
    #[error("invalid call target {0}")]
    InvalidTarget(i32),

    /// Reading PCM for a voice stream failed.
    #[error("voice source error: {0}")]
    VoiceSource(std::io::Error),

    /// A background thread could not be started.
    #[error("failed to spawn thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
