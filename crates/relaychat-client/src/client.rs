use std::fmt::Display;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex, PoisonError};

use relaychat_frame::{Frame, FrameError, FrameReader, FrameWriter, MessageType, BROADCAST};
use relaychat_transport::{RelayStream, TcpTransport};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Connect to a relay with default configuration.
pub fn connect<A>(addr: A) -> Result<Client>
where
    A: ToSocketAddrs + Display,
{
    Client::connect_with_config(addr, &ClientConfig::default())
}

/// A connection to a relay.
///
/// The relay assigns an identity on accept but never tells the client what
/// it is; peers learn each other's identities from the routing id of the
/// frames they receive.
pub struct Client {
    sender: ClientSender,
    receiver: ClientReceiver,
}

impl Client {
    /// Connect with default configuration.
    pub fn connect<A>(addr: A) -> Result<Self>
    where
        A: ToSocketAddrs + Display,
    {
        connect(addr)
    }

    /// Connect with explicit configuration.
    pub fn connect_with_config<A>(addr: A, config: &ClientConfig) -> Result<Self>
    where
        A: ToSocketAddrs + Display,
    {
        let stream = TcpTransport::connect_timeout(addr, config.connect_timeout)?;
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr();
        let reader_stream = stream.try_clone()?;

        let reader = FrameReader::with_config_tcp(reader_stream, config.frame.clone())?;
        let writer = FrameWriter::with_config_tcp(stream, config.frame.clone())?;
        debug!(peer = ?peer_addr, "connected to relay");

        Ok(Self {
            sender: ClientSender {
                writer: Arc::new(Mutex::new(writer)),
            },
            receiver: ClientReceiver { reader },
        })
    }

    /// Send one frame. `target` is a peer identity or [`BROADCAST`].
    pub fn send(&self, kind: MessageType, target: i32, body: &[u8]) -> Result<()> {
        self.sender.send(kind, target, body)
    }

    /// Send UTF-8 text.
    pub fn send_text(&self, target: i32, text: &str) -> Result<()> {
        self.sender.send_text(target, text)
    }

    /// Send an empty-bodied call-control frame.
    pub fn send_signal(&self, kind: MessageType, target: i32) -> Result<()> {
        self.sender.send_signal(kind, target)
    }

    /// Block until the next frame arrives.
    pub fn recv(&mut self) -> Result<Frame> {
        self.receiver.recv()
    }

    /// A cloneable handle for sending from other threads.
    pub fn sender(&self) -> ClientSender {
        self.sender.clone()
    }

    /// Split into independently owned send and receive halves.
    pub fn split(self) -> (ClientSender, ClientReceiver) {
        (self.sender, self.receiver)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.receiver.reader.get_ref().peer_addr()
    }

    /// Close the connection in both directions.
    pub fn close(&self) -> Result<()> {
        self.sender.close()
    }
}

/// Sending half of a [`Client`].
///
/// Clones share one writer; each frame is written under its lock, so
/// concurrent senders never interleave bytes.
#[derive(Clone)]
pub struct ClientSender {
    writer: Arc<Mutex<FrameWriter<RelayStream>>>,
}

impl ClientSender {
    pub fn send(&self, kind: MessageType, target: i32, body: &[u8]) -> Result<()> {
        self.lock().send(kind, target, body).map_err(closed_to_disconnected)
    }

    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        self.lock().write_frame(frame).map_err(closed_to_disconnected)
    }

    pub fn send_text(&self, target: i32, text: &str) -> Result<()> {
        self.send(MessageType::Text, target, text.as_bytes())
    }

    pub fn broadcast_text(&self, text: &str) -> Result<()> {
        self.send_text(BROADCAST, text)
    }

    pub fn send_signal(&self, kind: MessageType, target: i32) -> Result<()> {
        self.send(kind, target, &[])
    }

    /// Shut the socket down. The receiving half sees the connection close.
    pub fn close(&self) -> Result<()> {
        self.lock().get_ref().shutdown()?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrameWriter<RelayStream>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receiving half of a [`Client`].
pub struct ClientReceiver {
    reader: FrameReader<RelayStream>,
}

impl ClientReceiver {
    /// Block until the next frame arrives.
    ///
    /// Returns [`ClientError::Disconnected`] once the relay closes the
    /// connection.
    pub fn recv(&mut self) -> Result<Frame> {
        self.reader.read_frame().map_err(closed_to_disconnected)
    }
}

impl Iterator for ClientReceiver {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.recv() {
            Ok(frame) => Some(Ok(frame)),
            Err(ClientError::Disconnected) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

fn closed_to_disconnected(err: FrameError) -> ClientError {
    match err {
        FrameError::ConnectionClosed => ClientError::Disconnected,
        FrameError::Io(io)
            if matches!(
                io.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ) =>
        {
            ClientError::Disconnected
        }
        other => ClientError::Frame(other),
    }
}
