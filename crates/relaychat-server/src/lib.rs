//! Thread-per-connection relay for the relaychat protocol.
//!
//! Every accepted socket gets an identity from the [`Registry`] and its own
//! reader thread. Each frame read is handed to the [`Router`], which rewrites
//! the routing id to the true sender and writes the frame to one target or to
//! everyone else. Call-control frames are additionally announced to all
//! connections as system text.

pub mod config;
pub mod connection;
pub mod error;
pub mod interceptor;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use connection::{Connection, Identity, Outbound};
pub use error::{Result, ServerError};
pub use registry::Registry;
pub use router::{Delivery, Route, Router};
pub use server::{RelayServer, RunningServer, ShutdownHandle};
pub use session::SessionEnd;
