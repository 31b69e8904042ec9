use relaychat_frame::FrameConfig;
use relaychat_transport::DEFAULT_BIND_ADDR;

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on. Default: `0.0.0.0:8889`.
    pub bind_addr: String,
    /// Per-connection frame limits and socket timeouts. No timeouts by
    /// default: a silent peer keeps its slot until the OS reports the socket
    /// closed. Bodies above 64 MiB are refused and the sender disconnected
    /// unless `max_body_size` is raised; the wire format itself allows up to
    /// `i32::MAX` bytes.
    pub frame: FrameConfig,
    /// Disable Nagle's algorithm on accepted sockets. Default: true.
    pub nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            frame: FrameConfig::default(),
            nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Default configuration listening on `bind_addr`.
    pub fn with_bind_addr(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            ..Self::default()
        }
    }
}
