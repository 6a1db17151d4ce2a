//! Remote side of the tunnel
//!
//! Terminates TLS and forwards every connection as plaintext TCP to the
//! destination.

use log::{debug, error, info, warn};
use openssl::ssl::{Ssl, SslAcceptor};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_openssl::SslStream;

use crate::common::{Result, TunnelError};
use crate::config::TunnelConfig;

use super::counter::SessionCounter;
use super::relay::{Endpoint, Relay};

/// TLS listener forwarding as plaintext
pub struct RemoteServer {
    /// Listen address for TLS clients
    listen_addr: SocketAddr,
    /// Plaintext destination (host:port)
    target_addr: String,
    /// TLS acceptor carrying the server identity
    tls_acceptor: Arc<SslAcceptor>,
    /// Active sessions of this server
    sessions: Arc<SessionCounter>,
    /// Bound for the TLS accept and for the destination connect
    connect_timeout: Duration,
    relay: Relay,
}

/// Per-connection settings handed to each task
#[derive(Clone)]
struct Route {
    target_addr: String,
    tls_acceptor: Arc<SslAcceptor>,
    sessions: Arc<SessionCounter>,
    connect_timeout: Duration,
    relay: Relay,
}

impl RemoteServer {
    /// Create a remote server
    ///
    /// # Parameters
    ///
    /// * `listen_addr` - Listen address
    /// * `target_addr` - Plaintext destination
    /// * `tls_acceptor` - TLS acceptor
    /// * `sessions` - Session counter
    pub fn new(
        listen_addr: SocketAddr,
        target_addr: impl Into<String>,
        tls_acceptor: SslAcceptor,
        sessions: Arc<SessionCounter>,
    ) -> Self {
        Self {
            listen_addr,
            target_addr: target_addr.into(),
            tls_acceptor: Arc::new(tls_acceptor),
            sessions,
            connect_timeout: TunnelConfig::default().connect_timeout(),
            relay: Relay::new(Endpoint::Origin),
        }
    }

    /// Create a remote server from the tunnel configuration
    pub fn from_config(
        config: &TunnelConfig,
        tls_acceptor: SslAcceptor,
        sessions: Arc<SessionCounter>,
    ) -> Self {
        Self::new(config.listen, config.target.clone(), tls_acceptor, sessions)
            .with_connect_timeout(config.connect_timeout())
            .with_buffer_size(config.buffer_size)
    }

    /// Set the bound for TLS accept and destination connect
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Set the relay buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.relay = self.relay.with_buffer_size(buffer_size);
        self
    }

    /// Session counter of this server
    pub fn sessions(&self) -> &Arc<SessionCounter> {
        &self.sessions
    }

    /// Bind the listen address and serve until an error occurs
    ///
    /// # Errors
    ///
    /// Returns an error if it cannot bind to the listen address.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await.map_err(|e| {
            error!("Failed to listen on {}: {}", self.listen_addr, e);
            TunnelError::Io(e)
        })?;

        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!("Remote tunnel listening on {}, forwarding to {}", local_addr, self.target_addr);

        let route = Route {
            target_addr: self.target_addr.clone(),
            tls_acceptor: Arc::clone(&self.tls_acceptor),
            sessions: Arc::clone(&self.sessions),
            connect_timeout: self.connect_timeout,
            relay: self.relay,
        };
        let mut tasks = JoinSet::new();

        loop {
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    error!("Task error: {}", e);
                }
            }

            match listener.accept().await {
                Ok((conn, peer)) => {
                    let accepted = Instant::now();
                    debug!("Accepted connection from {}", peer);
                    let route = route.clone();
                    tasks.spawn(async move { handle_connection(conn, peer, accepted, route).await });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(conn: TcpStream, peer: SocketAddr, accepted: Instant, route: Route) {
    if let Err(e) = conn.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
    }

    let mut stream = match accept_tls(conn, &route).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("TLS handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let target = match timeout(route.connect_timeout, TcpStream::connect(&route.target_addr)).await {
        Ok(Ok(target)) => target,
        Ok(Err(e)) => {
            error!("Failed to reach {} for {}: {}", route.target_addr, peer, e);
            close_tls(&mut stream, peer).await;
            return;
        }
        Err(_) => {
            error!("Timed out connecting to {} for {}", route.target_addr, peer);
            close_tls(&mut stream, peer).await;
            return;
        }
    };

    let session = route.sessions.open_since(accepted);
    info!(
        "[#{}] {} -> {} (resumed: {}, active {})",
        session.id(),
        peer,
        route.target_addr,
        stream.ssl().session_reused(),
        session.active()
    );
    route.relay.run(&session, stream, target).await;
}

async fn accept_tls(conn: TcpStream, route: &Route) -> Result<SslStream<TcpStream>> {
    let ssl = Ssl::new(route.tls_acceptor.context())?;
    let mut stream = SslStream::new(ssl, conn)?;

    match timeout(route.connect_timeout, Pin::new(&mut stream).accept()).await {
        Ok(Ok(())) => Ok(stream),
        Ok(Err(e)) => Err(TunnelError::TlsHandshake(e.to_string())),
        Err(_) => Err(TunnelError::Timeout("TLS accept".to_string())),
    }
}

async fn close_tls(stream: &mut SslStream<TcpStream>, peer: SocketAddr) {
    if let Err(e) = stream.shutdown().await {
        debug!("Close {}: {}", peer, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::ssl::SslMethod;

    fn acceptor() -> SslAcceptor {
        SslAcceptor::mozilla_modern(SslMethod::tls()).unwrap().build()
    }

    #[test]
    fn test_connect_timeout_follows_config_default() {
        let server = RemoteServer::new(
            "127.0.0.1:0".parse().unwrap(),
            "127.0.0.1:6000",
            acceptor(),
            Arc::new(SessionCounter::new("remote")),
        );
        assert_eq!(server.connect_timeout, TunnelConfig::default().connect_timeout());

        let server = server.with_connect_timeout(Duration::from_secs(3));
        assert_eq!(server.connect_timeout, Duration::from_secs(3));
    }
}
