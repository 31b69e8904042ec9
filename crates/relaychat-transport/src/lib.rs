//! TCP transport for the relaychat protocol.
//!
//! This is the lowest layer of relaychat. It owns the listening socket and
//! hands out [`RelayStream`] values; everything else builds on top of them.
//! There is no handshake: the first bytes a peer writes after connecting
//! are expected to be a frame header.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::RelayStream;
pub use tcp::{TcpTransport, DEFAULT_BIND_ADDR, DEFAULT_PORT};
