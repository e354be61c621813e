//! TCP listener and per-connection workers.
//!
//! The server accepts on a blocking `std::net::TcpListener` and hands each
//! socket to its own named thread. Connections share nothing but the
//! read-only config, the backend and a few atomic counters.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mysqlmock_core::{Backend, Error};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::connection::{serve_connection, ConnectionMachine};

/// Connection counters.
#[derive(Debug)]
pub struct ServerStats {
    next_connection_id: AtomicU32,
    active: AtomicUsize,
    accepted: AtomicU64,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self {
            next_connection_id: AtomicU32::new(1),
            active: AtomicUsize::new(0),
            accepted: AtomicU64::new(0),
        }
    }
}

impl ServerStats {
    /// Connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Connections accepted since start.
    pub fn accepted_connections(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> u32 {
        self.next_connection_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// Decrements the active count when a worker ends, however it ends.
struct ActiveGuard(Arc<ServerStats>);

impl ActiveGuard {
    fn enter(stats: Arc<ServerStats>) -> Self {
        stats.active.fetch_add(1, Ordering::SeqCst);
        stats.accepted.fetch_add(1, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A bound, not yet serving, mock server.
pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    backend: Arc<dyn Backend>,
    stats: Arc<ServerStats>,
    shutdown: Arc<AtomicBool>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.listener.local_addr().ok())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Bind the listener described by `config`.
    pub fn bind(config: ServerConfig, backend: Arc<dyn Backend>) -> Result<Self, Error> {
        let listener = TcpListener::bind(config.socket_addr())?;
        info!(addr = %listener.local_addr()?, version = %config.server_version, "listening");
        Ok(Self {
            listener,
            config: Arc::new(config),
            backend,
            stats: Arc::new(ServerStats::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Accept connections until shut down.
    ///
    /// Accept failures are logged and skipped; they never stop the loop.
    pub fn serve(self) -> Result<(), Error> {
        for stream in self.listener.incoming() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match stream {
                Ok(stream) => self.spawn_worker(stream),
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
        info!("listener stopped");
        Ok(())
    }

    /// Run [`Server::serve`] on a background thread.
    pub fn spawn(self) -> Result<ServerHandle, Error> {
        let local_addr = self.local_addr()?;
        let shutdown = Arc::clone(&self.shutdown);
        let stats = Arc::clone(&self.stats);
        let thread = thread::Builder::new()
            .name("mysqlmock-accept".to_string())
            .spawn(move || self.serve())?;
        Ok(ServerHandle {
            local_addr,
            shutdown,
            stats,
            thread: Some(thread),
        })
    }

    fn spawn_worker(&self, stream: TcpStream) {
        let connection_id = self.stats.next_id();
        let peer = stream.peer_addr().ok();
        info!(connection_id, peer = ?peer, "connection accepted");

        let machine =
            ConnectionMachine::new(connection_id, Arc::clone(&self.config), Arc::clone(&self.backend));
        let config = Arc::clone(&self.config);
        let guard = ActiveGuard::enter(Arc::clone(&self.stats));

        let spawned = thread::Builder::new()
            .name(format!("mysqlmock-conn-{connection_id}"))
            .spawn(move || {
                let _guard = guard;
                match serve_connection(stream, machine, &config) {
                    Ok(()) => debug!(connection_id, "worker finished"),
                    Err(e) => warn!(connection_id, error = %e, "connection ended with error"),
                }
            });
        if let Err(e) = spawned {
            error!(connection_id, error = %e, "failed to spawn connection worker");
        }
    }
}

/// Handle to a server running on a background thread.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    stats: Arc<ServerStats>,
    thread: Option<JoinHandle<Result<(), Error>>>,
}

impl ServerHandle {
    /// Address clients should connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Stop accepting and wait for the accept loop to exit.
    ///
    /// Connections already being served run to completion on their own
    /// threads.
    pub fn shutdown(mut self) -> Result<(), Error> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), Error> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the blocking accept so it sees the flag.
        let _ = TcpStream::connect(self.local_addr);
        match thread.join() {
            Ok(result) => result,
            Err(_) => Err(Error::Custom("accept thread panicked".to_string())),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "server shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysqlmock_core::{NotFoundError, QueryError, ResultSet};
    use std::io::Read;
    use std::time::{Duration, Instant};

    struct Nothing;

    impl Backend for Nothing {
        fn execute(&self, _: &str, _: u32, _: Option<&str>) -> Result<ResultSet, QueryError> {
            Ok(ResultSet::affected(0))
        }

        fn select_database(&self, name: &str) -> Result<(), NotFoundError> {
            Err(NotFoundError {
                name: name.to_string(),
            })
        }
    }

    fn spawn() -> ServerHandle {
        let config = ServerConfig::new().bind_address("127.0.0.1").port(0);
        Server::bind(config, Arc::new(Nothing))
            .unwrap()
            .spawn()
            .unwrap()
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_connection_ids_increase() {
        let handle = spawn();
        let mut ids = Vec::new();
        for _ in 0..2 {
            let mut stream = TcpStream::connect(handle.local_addr()).unwrap();
            let mut header = [0u8; 4];
            stream.read_exact(&mut header).unwrap();
            let len = usize::from(header[0]) | usize::from(header[1]) << 8;
            let mut payload = vec![0u8; len];
            stream.read_exact(&mut payload).unwrap();
            let greeting = crate::handshake::Greeting::parse(&payload).unwrap();
            ids.push(greeting.connection_id);
        }
        assert_eq!(ids, vec![1, 2]);
        handle.shutdown().unwrap();
    }

    #[test]
    fn test_active_count_drops_after_disconnect() {
        let handle = spawn();
        let stream = TcpStream::connect(handle.local_addr()).unwrap();
        assert!(wait_for(|| handle.stats().active_connections() == 1));
        drop(stream);
        assert!(wait_for(|| handle.stats().active_connections() == 0));
        assert_eq!(handle.stats().accepted_connections(), 1);
    }
}
