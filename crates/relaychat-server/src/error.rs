/// Errors that can occur while running the relay.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] relaychat_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] relaychat_frame::FrameError),

    /// Every positive identity has been handed out once already.
    #[error("connection identities exhausted")]
    IdentitiesExhausted,

    /// The per-connection reader thread could not be started.
    #[error("failed to spawn connection thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
