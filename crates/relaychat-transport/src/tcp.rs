use std::fmt::Display;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::RelayStream;

/// Port the relay listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 8889;

/// Default listening address: every interface on [`DEFAULT_PORT`].
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8889";

/// TCP listening transport.
///
/// Provides bind/accept/connect over a single TCP listening socket.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `addr`.
    ///
    /// Port 0 asks the OS for an ephemeral port; [`TcpTransport::local_addr`]
    /// reports the one actually bound.
    pub fn bind<A>(addr: A) -> Result<Self>
    where
        A: ToSocketAddrs + Display,
    {
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;

        info!(addr = %local_addr, "listening on tcp socket");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<(RelayStream, SocketAddr)> {
        let (stream, addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(peer = %addr, "accepted connection");
        Ok((RelayStream::from_tcp(stream), addr))
    }

    /// Connect to a listening relay (blocking).
    pub fn connect<A>(addr: A) -> Result<RelayStream>
    where
        A: ToSocketAddrs + Display,
    {
        let stream = TcpStream::connect(&addr).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        debug!(addr = %addr, "connected to relay");
        Ok(RelayStream::from_tcp(stream))
    }

    /// Connect to a listening relay, giving up after `timeout`.
    ///
    /// Every resolved address is tried in turn; the last failure is reported.
    pub fn connect_timeout<A>(addr: A, timeout: Duration) -> Result<RelayStream>
    where
        A: ToSocketAddrs + Display,
    {
        let connect_err = |source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        };

        let mut last_err = None;
        for resolved in addr.to_socket_addrs().map_err(connect_err)? {
            match TcpStream::connect_timeout(&resolved, timeout) {
                Ok(stream) => {
                    debug!(addr = %resolved, "connected to relay");
                    return Ok(RelayStream::from_tcp(stream));
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(connect_err(last_err.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "address resolved to nothing",
            )
        })))
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
