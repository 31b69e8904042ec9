use std::time::Duration;

use relaychat_frame::FrameConfig;

/// Default time allowed for the TCP connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client connection configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Frame limits and socket timeouts. The read timeout bounds every
    /// [`crate::Client::recv`]; leave it unset for a client that waits
    /// indefinitely for traffic.
    pub frame: FrameConfig,
    /// Default: 5 seconds.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}
