//! Per-connection reader loop.

use std::io::Read;
use std::sync::Arc;

use relaychat_frame::{FrameError, FrameReader};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::registry::Registry;
use crate::router::Router;

/// Why a connection's reader stopped.
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer closed the stream (cleanly or mid-frame).
    Closed,
    /// The peer sent a malformed header.
    Protocol(FrameError),
    /// Reading failed (reset, read timeout, local shutdown racing a read).
    Io(FrameError),
}

/// Read frames from `reader` and route them as coming from `connection`
/// until the stream ends.
///
/// However the loop ends, including a panic while routing, the socket is
/// shut down and the identity unregistered exactly once on the way out.
pub fn run<R: Read>(
    router: &Router,
    connection: Arc<Connection>,
    mut reader: FrameReader<R>,
) -> SessionEnd {
    let _guard = SessionGuard {
        registry: router.registry(),
        connection: &connection,
    };
    let id = connection.id();

    loop {
        match reader.read_frame() {
            Ok(frame) => {
                router.route(id, frame);
            }
            Err(FrameError::ConnectionClosed) => {
                debug!(id, "peer closed connection");
                return SessionEnd::Closed;
            }
            Err(err) if err.is_protocol_error() => {
                warn!(id, error = %err, "protocol error, closing connection");
                return SessionEnd::Protocol(err);
            }
            Err(err) => {
                info!(id, error = %err, "read failed, closing connection");
                return SessionEnd::Io(err);
            }
        }
    }
}

struct SessionGuard<'a> {
    registry: &'a Registry,
    connection: &'a Connection,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.connection.shutdown();
        self.registry.unregister(self.connection.id());
    }
}
