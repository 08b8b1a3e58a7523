//! Listener setup and the acceptor loop.
//!
//! One thread multiplexes the plaintext and TLS listeners with a
//! one-second readiness timeout; the timeout is the resolution at which
//! the shutdown and refresh flags are observed.  Accepted connections are
//! packaged into work items and handed to the worker pool.
use crate::cache::CacheTree;
use crate::config::ServerConfig;
use crate::conn::ClientStream;
use crate::handler::handle_client;
use crate::log::{error, info, tag, warn};
use crate::mime::MimeTable;
use crate::pool::WorkerPool;
use crate::tls;
use polling::{Event, Poller};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const BACKLOG: i32 = 20;
const ACCEPT_WAIT: Duration = Duration::from_secs(1);
const HTTP_KEY: usize = 0;
const HTTPS_KEY: usize = 1;

/// Opens a nonblocking wildcard listener with `SO_REUSEADDR`, so the
/// server can rebind its ports right after a restart.
///
/// # Errors
/// Returns an error when the socket cannot be created, bound, or listened.
pub fn create_listener(port: u16) -> Result<TcpListener, std::io::Error> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;
    let listener: TcpListener = socket.into();
    listener.set_nonblocking(true)?;
    Ok(listener)
}

pub struct Acceptor<'a> {
    http: TcpListener,
    https: TcpListener,
    poller: Poller,
    pool: &'a WorkerPool,
    tls_config: Arc<rustls::ServerConfig>,
    config: Arc<ServerConfig>,
    mime: Arc<MimeTable>,
    tree: Arc<CacheTree>,
    shutdown: Arc<AtomicBool>,
    refresh: Arc<AtomicBool>,
}
impl<'a> Acceptor<'a> {
    /// # Errors
    /// Returns an error when the poller cannot register the listeners.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        http: TcpListener,
        https: TcpListener,
        pool: &'a WorkerPool,
        tls_config: Arc<rustls::ServerConfig>,
        config: Arc<ServerConfig>,
        mime: Arc<MimeTable>,
        tree: Arc<CacheTree>,
        shutdown: Arc<AtomicBool>,
        refresh: Arc<AtomicBool>,
    ) -> Result<Self, std::io::Error> {
        let poller = Poller::new()?;
        poller.add(http.as_raw_fd(), Event::readable(HTTP_KEY))?;
        poller.add(https.as_raw_fd(), Event::readable(HTTPS_KEY))?;
        Ok(Self {
            http,
            https,
            poller,
            pool,
            tls_config,
            config,
            mime,
            tree,
            shutdown,
            refresh,
        })
    }

    /// Accepts connections until the shutdown flag is set.  Honors the
    /// refresh flag by draining the pool and swapping in a fresh tree, so
    /// no work item ever observes a partially built one.
    pub fn run(&mut self) {
        let mut events: Vec<Event> = Vec::new();
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info("shutdown signal observed", Vec::new());
                return;
            }
            if self.refresh.swap(false, Ordering::Relaxed) {
                self.refresh_tree();
            }
            events.clear();
            match self.poller.wait(&mut events, Some(ACCEPT_WAIT)) {
                // Timeout: loop again to check the flags.
                Ok(0) => continue,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error("listener wait failed", vec![tag("error", e.to_string())]);
                    return;
                }
            }
            for event in &events {
                match event.key {
                    HTTP_KEY => {
                        self.accept_plain();
                        let _ignored = self
                            .poller
                            .modify(self.http.as_raw_fd(), Event::readable(HTTP_KEY));
                    }
                    HTTPS_KEY => {
                        self.accept_tls();
                        let _ignored = self
                            .poller
                            .modify(self.https.as_raw_fd(), Event::readable(HTTPS_KEY));
                    }
                    _ => {}
                }
            }
        }
    }

    fn refresh_tree(&mut self) {
        info("refreshing fingerprint tree", Vec::new());
        // Submissions are paused while this thread rebuilds, and the pool
        // is drained, so the old tree has no readers when it is released.
        self.pool.wait();
        match CacheTree::build(&self.config.webroot) {
            Ok(tree) => {
                self.tree = Arc::new(tree);
                info(
                    "fingerprint tree refreshed",
                    vec![tag("files", self.tree.len())],
                );
            }
            Err(e) => {
                error(
                    "refresh failed, keeping previous tree",
                    vec![tag("error", e.to_string())],
                );
            }
        }
    }

    fn accept_plain(&self) {
        let Some((sock, peer)) = accept_one(&self.http, "http") else {
            return;
        };
        info("new http connection", vec![tag("peer", peer)]);
        self.submit(ClientStream::Plain(sock), peer);
    }

    fn accept_tls(&self) {
        let Some((sock, peer)) = accept_one(&self.https, "https") else {
            return;
        };
        info("new https connection", vec![tag("peer", peer)]);
        match tls::accept(&self.tls_config, sock) {
            Ok(session) => self.submit(ClientStream::Tls(Box::new(session)), peer),
            Err(e) => {
                warn(
                    "tls handshake failed",
                    vec![tag("peer", peer), tag("error", e.to_string())],
                );
            }
        }
    }

    fn submit(&self, stream: ClientStream, peer: SocketAddr) {
        let tree = Arc::clone(&self.tree);
        let config = Arc::clone(&self.config);
        let mime = Arc::clone(&self.mime);
        let submitted = self.pool.submit(move || {
            handle_client(stream, peer, &tree, &config, &mime);
        });
        if let Err(e) = submitted {
            // Dropping the rejected work item closes the socket.
            warn(
                "rejecting connection",
                vec![tag("peer", peer), tag("reason", format!("{e:?}"))],
            );
        }
    }
}

fn accept_one(listener: &TcpListener, which: &'static str) -> Option<(TcpStream, SocketAddr)> {
    match listener.accept() {
        Ok((sock, peer)) => {
            // The listener is nonblocking for the readiness wait; the
            // accepted socket must block for the worker.
            if let Err(e) = sock.set_nonblocking(false) {
                error(
                    "failed to configure accepted socket",
                    vec![tag("listener", which), tag("error", e.to_string())],
                );
                return None;
            }
            Some((sock, peer))
        }
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => None,
        Err(e) => {
            error(
                "accept failed",
                vec![tag("listener", which), tag("error", e.to_string())],
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::create_listener;

    #[test]
    fn listener_binds_ephemeral_port() {
        let listener = create_listener(0).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(0, addr.port());
        // A second bind to the same port must fail while the first is open.
        assert!(create_listener(addr.port()).is_err());
    }
}
