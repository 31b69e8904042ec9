//! TCP chat relay with binary framing and call signalling.
//!
//! Clients connect over TCP and exchange length-prefixed frames. The relay
//! assigns each connection an identity, forwards frames to one peer or to
//! everyone else, and announces call signalling to all connected clients.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener and stream
//! - [`frame`]: wire format, message types, blocking reader/writer
//! - [`server`]: the relay (behind the `server` feature)
//! - [`client`]: client connection and call state (behind the `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use relaychat_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use relaychat_frame::*;
}

/// Re-export relay server types (requires `server` feature).
#[cfg(feature = "server")]
pub mod server {
    pub use relaychat_server::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use relaychat_client::*;
}
