//! Local side of the tunnel
//!
//! Accepts plaintext TCP and carries every connection over its own TLS
//! connection to the remote side.

use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::common::{Result, TunnelError};
use crate::config::TunnelConfig;

use super::counter::SessionCounter;
use super::dial::SecureDialer;
use super::probe::probe;
use super::relay::{Endpoint, Relay};

/// How long the client probe waits after a failed dial
const PROBE_WAIT: Duration = Duration::from_millis(50);

/// Plaintext listener forwarding over TLS
pub struct LocalServer {
    /// Listen address for plaintext clients
    listen_addr: SocketAddr,
    /// Remote side of the tunnel (host:port)
    remote_addr: String,
    /// TLS client shared by every connection
    dialer: Arc<SecureDialer>,
    /// Active sessions of this server
    sessions: Arc<SessionCounter>,
    relay: Relay,
}

impl LocalServer {
    /// Create a local server
    ///
    /// # Parameters
    ///
    /// * `listen_addr` - Listen address
    /// * `remote_addr` - Remote side to dial for each connection
    /// * `dialer` - TLS client, its session cache is shared by all connections
    /// * `sessions` - Session counter
    pub fn new(
        listen_addr: SocketAddr,
        remote_addr: impl Into<String>,
        dialer: Arc<SecureDialer>,
        sessions: Arc<SessionCounter>,
    ) -> Self {
        Self {
            listen_addr,
            remote_addr: remote_addr.into(),
            dialer,
            sessions,
            relay: Relay::new(Endpoint::Leg),
        }
    }

    /// Create a local server from the tunnel configuration
    pub fn from_config(
        config: &TunnelConfig,
        dialer: Arc<SecureDialer>,
        sessions: Arc<SessionCounter>,
    ) -> Self {
        Self::new(config.listen, config.target.clone(), dialer, sessions)
            .with_buffer_size(config.buffer_size)
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
        info!("Local tunnel listening on {}, forwarding to {}", local_addr, self.remote_addr);

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

                    let remote_addr = self.remote_addr.clone();
                    let dialer = Arc::clone(&self.dialer);
                    let sessions = Arc::clone(&self.sessions);
                    let relay = self.relay;

                    tasks.spawn(async move {
                        handle_connection(conn, peer, accepted, &remote_addr, &dialer, &sessions, relay).await
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    mut conn: TcpStream,
    peer: SocketAddr,
    accepted: Instant,
    remote_addr: &str,
    dialer: &SecureDialer,
    sessions: &Arc<SessionCounter>,
    relay: Relay,
) {
    let stream = match dialer.dial(remote_addr).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to reach {} for {}: {}", remote_addr, peer, e);
            if log::log_enabled!(log::Level::Debug) {
                let state = probe(&conn, PROBE_WAIT).await;
                debug!("Client {} state: {}", peer, state);
            }
            if let Err(e) = conn.shutdown().await {
                debug!("Close {}: {}", peer, e);
            }
            return;
        }
    };

    if let Err(e) = conn.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
    }

    let session = sessions.open_since(accepted);
    info!("[#{}] {} -> {} (active {})", session.id(), peer, remote_addr, session.active());
    relay.run(&session, conn, stream).await;
}
