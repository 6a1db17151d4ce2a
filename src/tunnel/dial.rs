//! Secure dialer
//!
//! Opens TLS connections to the remote side of the tunnel. Sessions handed
//! out by the server are kept in a shared [`SessionCache`] keyed by the host
//! being dialed, and offered again on the next dial to that host.

use log::{debug, info};
use metrics::{counter, histogram};
use openssl::ex_data::Index;
use openssl::ssl::{
    Ssl, SslConnector, SslMethod, SslRef, SslSession, SslSessionCacheMode, SslVerifyMode,
};
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_openssl::SslStream;

use crate::common::{host_of, Result, TunnelError};
use crate::config::TunnelConfig;
use crate::tls::SessionCache;

/// TLS client for the remote side of the tunnel
pub struct SecureDialer {
    connector: SslConnector,
    cache: Arc<SessionCache>,
    key_index: Index<Ssl, String>,
    verify: bool,
    connect_timeout: Duration,
}

impl SecureDialer {
    /// Create a dialer
    ///
    /// # Parameters
    ///
    /// * `ca_cert` - Extra trust anchors (PEM); system roots are used when `None`
    /// * `insecure_skip_verify` - Accept any peer certificate and name
    /// * `connect_timeout` - Bound for the TCP connect and for the handshake
    /// * `cache` - Session cache shared with other dialers
    pub fn new(
        ca_cert: Option<&Path>,
        insecure_skip_verify: bool,
        connect_timeout: Duration,
        cache: Arc<SessionCache>,
    ) -> Result<Self> {
        let mut builder = SslConnector::builder(SslMethod::tls())?;

        if let Some(ca) = ca_cert {
            builder.set_ca_file(ca).map_err(|e| {
                TunnelError::Certificate(format!("Failed to load CA file {}: {}", ca.display(), e))
            })?;
        }
        if insecure_skip_verify {
            builder.set_verify(SslVerifyMode::NONE);
        }

        // Sessions are stored by us, not by OpenSSL's internal cache
        let key_index = Ssl::new_ex_index::<String>()?;
        builder.set_session_cache_mode(
            SslSessionCacheMode::CLIENT | SslSessionCacheMode::NO_INTERNAL_STORE,
        );
        let sessions = Arc::clone(&cache);
        builder.set_new_session_callback(move |ssl: &mut SslRef, session: SslSession| {
            if let Some(key) = ssl.ex_data(key_index) {
                debug!("Caching TLS session for {}", key);
                if let Some(evicted) = sessions.put(key.clone(), session) {
                    debug!("Evicted cached TLS session for {}", evicted);
                }
            }
        });

        Ok(Self {
            connector: builder.build(),
            cache,
            key_index,
            verify: !insecure_skip_verify,
            connect_timeout,
        })
    }

    /// Create a dialer from the tunnel configuration
    pub fn from_config(config: &TunnelConfig, cache: Arc<SessionCache>) -> Result<Self> {
        Self::new(
            config.ca_cert.as_deref(),
            config.insecure_skip_verify,
            config.connect_timeout(),
            cache,
        )
    }

    /// Session cache used by this dialer
    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// Connect to `addr` and complete a TLS handshake
    ///
    /// The server is verified against the host part of `addr` unless
    /// verification is disabled. A cached session for that host is offered
    /// for resumption.
    pub async fn dial(&self, addr: &str) -> Result<SslStream<TcpStream>> {
        let host = host_of(addr);
        let started = Instant::now();

        let tcp = match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(e)) => {
                counter!("tunnel.dial.errors", "stage" => "connect").increment(1);
                return Err(TunnelError::Io(e));
            }
            Err(_) => {
                counter!("tunnel.dial.errors", "stage" => "connect").increment(1);
                return Err(TunnelError::Timeout(format!("connect to {}", addr)));
            }
        };
        if let Err(e) = tcp.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let mut config = self.connector.configure()?;
        if !self.verify {
            config.set_verify_hostname(false);
        }
        let mut ssl = config.into_ssl(host)?;
        ssl.set_ex_data(self.key_index, host.to_string());

        let offered = self.cache.get(host);
        if let Some(ref session) = offered {
            // SAFETY: the session comes from a connection made with this
            // connector's context.
            if let Err(e) = unsafe { ssl.set_session(session) } {
                debug!("Cached session for {} not usable: {}", host, e);
            }
        }

        let mut stream = SslStream::new(ssl, tcp)?;
        match timeout(self.connect_timeout, Pin::new(&mut stream).connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if offered.is_some() {
                    self.cache.remove(host);
                }
                counter!("tunnel.dial.errors", "stage" => "handshake").increment(1);
                debug!("TLS handshake with {} failed after {:?}", addr, started.elapsed());
                return Err(TunnelError::TlsHandshake(e.to_string()));
            }
            Err(_) => {
                counter!("tunnel.dial.errors", "stage" => "handshake").increment(1);
                return Err(TunnelError::Timeout(format!("TLS handshake with {}", addr)));
            }
        }

        let cost = started.elapsed();
        let info = HandshakeInfo::of(stream.ssl(), cost);
        info!("Connected to {} ({})", addr, info);

        counter!("tunnel.dial.total").increment(1);
        if info.resumed {
            counter!("tunnel.dial.resumed").increment(1);
        }
        histogram!("tunnel.dial.handshake_ms").record(cost.as_millis() as f64);

        Ok(stream)
    }
}

impl fmt::Debug for SecureDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureDialer")
            .field("verify", &self.verify)
            .field("connect_timeout", &self.connect_timeout)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Negotiated parameters of a finished handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// The session was resumed from the cache
    pub resumed: bool,
    /// Negotiated protocol version
    pub version: &'static str,
    /// Negotiated cipher suite
    pub cipher: String,
    /// Connect plus handshake time
    pub cost: Duration,
}

impl HandshakeInfo {
    /// Read the negotiated parameters from a connection
    pub fn of(ssl: &SslRef, cost: Duration) -> Self {
        Self {
            resumed: ssl.session_reused(),
            version: ssl.version_str(),
            cipher: ssl
                .current_cipher()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "none".to_string()),
            cost,
        }
    }
}

impl fmt::Display for HandshakeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resumed: {}, {} {}, cost: {:?}",
            self.resumed, self.version, self.cipher, self.cost
        )
    }
}
