use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use relaychat_frame::FrameReader;
use relaychat_transport::{RelayStream, TcpTransport, TransportError};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::Outbound;
use crate::error::{Result, ServerError};
use crate::registry::Registry;
use crate::router::Router;
use crate::session;

const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause after an accept failure that will not clear on its own
/// (descriptor or memory exhaustion, a broken listener).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections and runs one reader thread per connection.
pub struct RelayServer {
    transport: TcpTransport,
    router: Router,
    config: ServerConfig,
    running: Arc<AtomicBool>,
}

impl RelayServer {
    /// Bind the listening socket. Nothing is accepted until [`RelayServer::run`].
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let transport = TcpTransport::bind(config.bind_addr.as_str())?;
        Ok(Self {
            transport,
            router: Router::new(Arc::new(Registry::new())),
            config,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Connection registry shared by every reader thread.
    pub fn registry(&self) -> &Arc<Registry> {
        self.router.registry()
    }

    /// Handle that stops [`RelayServer::run`] from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
            wake_addr: wake_addr(self.local_addr()),
            registry: Arc::clone(self.registry()),
        }
    }

    /// Accept connections until shut down.
    ///
    /// A failed accept or a connection that cannot be set up is logged and
    /// skipped; the loop keeps serving everyone else. Persistent accept
    /// failures are retried after a short pause.
    pub fn run(&self) -> Result<()> {
        info!(addr = %self.local_addr(), "relay started");
        self.accept_loop(|| self.transport.accept());
        self.registry().close_all();
        info!("relay stopped");
        Ok(())
    }

    fn accept_loop<F>(&self, mut accept: F)
    where
        F: FnMut() -> relaychat_transport::Result<(RelayStream, SocketAddr)>,
    {
        while self.running.load(Ordering::SeqCst) {
            let (stream, peer) = match accept() {
                Ok(accepted) => accepted,
                Err(err) => {
                    match accept_backoff(&err) {
                        Some(pause) => {
                            warn!(
                                error = %err,
                                backoff_ms = pause.as_millis() as u64,
                                "accept failed"
                            );
                            thread::sleep(pause);
                        }
                        None => debug!(error = %err, "accept interrupted"),
                    }
                    continue;
                }
            };

            if !self.running.load(Ordering::SeqCst) {
                let _ = stream.shutdown();
                break;
            }

            if let Err(err) = self.start_session(stream) {
                warn!(peer = %peer, error = %err, "failed to start connection");
            }
        }
    }

    /// Run the accept loop on a background thread.
    pub fn spawn(self) -> Result<RunningServer> {
        let local_addr = self.local_addr();
        let handle = self.shutdown_handle();
        let registry = Arc::clone(self.registry());
        let thread = thread::Builder::new()
            .name("relay-accept".to_string())
            .spawn(move || self.run())
            .map_err(ServerError::Spawn)?;

        Ok(RunningServer {
            local_addr,
            handle,
            registry,
            thread,
        })
    }

    fn start_session(&self, stream: RelayStream) -> Result<()> {
        if self.config.nodelay {
            stream.set_nodelay(true)?;
        }
        let read_half = stream.try_clone()?;
        let reader = FrameReader::with_config_tcp(read_half, self.config.frame.clone())?;
        let outbound = Outbound::tcp(stream, &self.config.frame)?;

        let connection = self.registry().register(outbound)?;
        let id = connection.id();
        let router = self.router.clone();
        let session_conn = Arc::clone(&connection);

        let spawned = thread::Builder::new()
            .name(format!("relay-conn-{id}"))
            .spawn(move || {
                let end = session::run(&router, session_conn, reader);
                debug!(id, ?end, "session ended");
            });

        if let Err(err) = spawned {
            connection.shutdown();
            self.registry().unregister(id);
            return Err(ServerError::Spawn(err));
        }
        Ok(())
    }
}

/// Stops a running [`RelayServer`].
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    wake_addr: SocketAddr,
    registry: Arc<Registry>,
}

impl ShutdownHandle {
    /// Stop accepting and close every connection. Idempotent.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("relay shutting down");

        // The accept loop is blocked in accept(); a throwaway connection wakes it.
        if let Err(err) = TcpTransport::connect_timeout(self.wake_addr, WAKE_TIMEOUT) {
            debug!(error = %err, "wake-up connection failed");
        }
        self.registry.close_all();
    }

    /// True until [`ShutdownHandle::shutdown`] has been called.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// A relay accepting on a background thread.
pub struct RunningServer {
    local_addr: SocketAddr,
    handle: ShutdownHandle,
    registry: Arc<Registry>,
    thread: JoinHandle<Result<()>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    /// Shut down and wait for the accept loop to exit.
    pub fn stop(self) -> Result<()> {
        self.handle.shutdown();
        match self.thread.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// How long to wait before accepting again. `None` for failures tied to a
/// single pending connection, which are retried at once.
fn accept_backoff(err: &TransportError) -> Option<Duration> {
    let source = match err {
        TransportError::Accept(source) | TransportError::Io(source) => source,
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => source,
    };
    match source.kind() {
        io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}

fn wake_addr(local: SocketAddr) -> SocketAddr {
    match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), local.port())
        }
        _ => local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_addr_maps_unspecified_to_loopback() {
        let any: SocketAddr = "0.0.0.0:8889".parse().unwrap();
        assert_eq!(wake_addr(any), "127.0.0.1:8889".parse().unwrap());

        let any6: SocketAddr = "[::]:8889".parse().unwrap();
        assert_eq!(wake_addr(any6), "[::1]:8889".parse().unwrap());

        let fixed: SocketAddr = "192.168.1.4:9000".parse().unwrap();
        assert_eq!(wake_addr(fixed), fixed);
    }

    #[test]
    fn accept_backoff_only_for_persistent_failures() {
        let aborted = TransportError::Accept(io::ErrorKind::ConnectionAborted.into());
        assert_eq!(accept_backoff(&aborted), None);
        let interrupted = TransportError::Accept(io::ErrorKind::Interrupted.into());
        assert_eq!(accept_backoff(&interrupted), None);

        let out_of_memory = TransportError::Accept(io::ErrorKind::OutOfMemory.into());
        assert_eq!(accept_backoff(&out_of_memory), Some(ACCEPT_BACKOFF));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn descriptor_exhaustion_backs_off() {
        // EMFILE and ENFILE.
        for errno in [24, 23] {
            let err = TransportError::Accept(io::Error::from_raw_os_error(errno));
            assert_eq!(accept_backoff(&err), Some(ACCEPT_BACKOFF));
        }
    }

    #[test]
    fn failing_accept_does_not_spin() {
        let server = RelayServer::bind(ServerConfig::with_bind_addr("127.0.0.1:0")).unwrap();
        let running = Arc::clone(&server.running);
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(500));
            running.store(false, Ordering::SeqCst);
        });

        let mut attempts = 0u32;
        server.accept_loop(|| {
            attempts += 1;
            Err(TransportError::Accept(io::Error::other("too many open files")))
        });
        stopper.join().unwrap();

        assert!(attempts >= 1);
        assert!(attempts <= 10, "accept retried {attempts} times in 500ms");
        assert!(server.registry().is_empty());
    }

    #[test]
    fn bind_reports_ephemeral_port() {
        let server = RelayServer::bind(ServerConfig::with_bind_addr("127.0.0.1:0")).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert!(server.registry().is_empty());
    }

    #[test]
    fn stop_returns_promptly_without_clients() {
        let server = RelayServer::bind(ServerConfig::with_bind_addr("127.0.0.1:0"))
            .unwrap()
            .spawn()
            .unwrap();
        let handle = server.shutdown_handle();
        assert!(handle.is_running());

        server.stop().unwrap();
        assert!(!handle.is_running());
    }
}
