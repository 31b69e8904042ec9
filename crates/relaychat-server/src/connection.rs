use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use relaychat_frame::{Frame, FrameConfig, FrameWriter};
use relaychat_transport::RelayStream;
use tracing::{debug, warn};

use crate::error::Result;

/// Server-assigned connection identity. Positive for real connections;
/// 0 is reserved for "broadcast" (as a target) and "system" (as a sender).
pub type Identity = i32;

type BoxedWriter = Box<dyn Write + Send>;

/// The write half of a connection, before it has been given an identity.
pub struct Outbound {
    writer: FrameWriter<BoxedWriter>,
    socket: Option<RelayStream>,
    peer_addr: Option<SocketAddr>,
}

impl Outbound {
    /// Write half of an accepted TCP connection.
    ///
    /// Keeps a second handle to the socket so the connection can be shut
    /// down from either side.
    pub fn tcp(stream: RelayStream, config: &FrameConfig) -> Result<Self> {
        stream.set_write_timeout(config.write_timeout)?;
        let peer_addr = stream.peer_addr();
        let socket = stream.try_clone()?;
        let writer: BoxedWriter = Box::new(stream);
        Ok(Self {
            writer: FrameWriter::with_config(writer, config.clone()),
            socket: Some(socket),
            peer_addr,
        })
    }

    /// Any writer can stand in for a socket, e.g. an in-memory buffer.
    pub fn from_writer<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        let writer: BoxedWriter = Box::new(writer);
        Self {
            writer: FrameWriter::new(writer),
            socket: None,
            peer_addr: None,
        }
    }
}

/// A registered peer.
///
/// The writer sits behind the connection's own lock: one complete frame is
/// written per lock hold, so concurrent senders never interleave bytes on
/// this socket, while sends to other connections proceed in parallel.
pub struct Connection {
    id: Identity,
    peer_addr: Option<SocketAddr>,
    writer: Mutex<FrameWriter<BoxedWriter>>,
    socket: Option<RelayStream>,
    broken: AtomicBool,
}

impl Connection {
    pub(crate) fn new(id: Identity, outbound: Outbound) -> Self {
        Self {
            id,
            peer_addr: outbound.peer_addr,
            writer: Mutex::new(outbound.writer),
            socket: outbound.socket,
            broken: AtomicBool::new(false),
        }
    }

    /// This connection's identity.
    pub fn id(&self) -> Identity {
        self.id
    }

    /// Remote address, when backed by a socket.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// True once a write to this connection has failed.
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    /// Write one frame to this connection.
    ///
    /// Returns `false` if the frame could not be written. Failures are logged
    /// here and never reach the caller's fan-out loop. After the first
    /// failure the socket is shut down (its reader then unregisters it) and
    /// further sends are skipped.
    pub fn send(&self, frame: &Frame) -> bool {
        if self.is_broken() {
            debug!(id = self.id, kind = %frame.kind, "skipping send to broken connection");
            return false;
        }

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match writer.write_frame(frame) {
            Ok(()) => true,
            Err(err) => {
                if !self.broken.swap(true, Ordering::AcqRel) {
                    warn!(
                        id = self.id,
                        kind = %frame.kind,
                        size = frame.body.len(),
                        error = %err,
                        "dropping frame, write failed"
                    );
                }
                drop(writer);
                self.shutdown();
                false
            }
        }
    }

    /// Shut the underlying socket down in both directions.
    pub fn shutdown(&self) {
        if let Some(socket) = &self.socket {
            if let Err(err) = socket.shutdown() {
                debug!(id = self.id, error = %err, "socket shutdown failed");
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("broken", &self.is_broken())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;
    use std::sync::Arc;

    use relaychat_frame::MessageType;

    use super::*;
    use crate::test_support::SharedBuffer;

    #[test]
    fn send_writes_complete_frame() {
        let sink = SharedBuffer::default();
        let conn = Connection::new(3, Outbound::from_writer(sink.clone()));

        assert!(conn.send(&Frame::text(1, "hi")));

        assert_eq!(sink.frames(), vec![Frame::text(1, "hi")]);
        assert_eq!(conn.id(), 3);
        assert!(conn.peer_addr().is_none());
    }

    #[test]
    fn failed_write_marks_connection_broken() {
        let conn = Connection::new(1, Outbound::from_writer(FailingWriter));

        assert!(!conn.send(&Frame::text(0, "lost")));
        assert!(conn.is_broken());
        assert!(!conn.send(&Frame::text(0, "also lost")));
    }

    #[test]
    fn concurrent_senders_never_interleave() {
        let sink = SharedBuffer::default();
        let conn = Arc::new(Connection::new(1, Outbound::from_writer(sink.clone())));

        let handles: Vec<_> = (0..8)
            .map(|sender| {
                let conn = Arc::clone(&conn);
                std::thread::spawn(move || {
                    let body = vec![sender as u8; 3000];
                    for _ in 0..50 {
                        assert!(conn.send(&Frame::new(
                            MessageType::VoiceStreamChunk,
                            sender,
                            body.clone()
                        )));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let frames = sink.frames();
        assert_eq!(frames.len(), 8 * 50);
        for frame in frames {
            assert!(frame.body.iter().all(|b| *b == frame.routing_id as u8));
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
