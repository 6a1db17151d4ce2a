//! TLS Tunnel: TCP over TLS with session resumption
//!
//! A two-sided tunnel. The local side accepts plaintext TCP connections and
//! carries each one over its own TLS connection to the remote side, which
//! terminates TLS and forwards the bytes as plaintext TCP to a destination.
//!
//! # Main Features
//!
//! - One TLS connection per accepted connection, no multiplexing
//! - Client-side TLS session resumption with a bounded LRU cache
//! - Half-close propagation in both directions
//! - Per-pair session ids and byte accounting
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tls_tunnel::tls::SessionCache;
//! use tls_tunnel::{LocalServer, Result, SecureDialer, SessionCounter, parse_socket_addr};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let cache = Arc::new(SessionCache::new(32));
//!     let dialer = SecureDialer::new(None, false, Duration::from_secs(30), cache)?;
//!
//!     let server = LocalServer::new(
//!         parse_socket_addr("127.0.0.1:1080")?,
//!         "tunnel.example.com:443",
//!         Arc::new(dialer),
//!         Arc::new(SessionCounter::new("local")),
//!     );
//!
//!     server.run().await
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod tls;
pub mod tunnel;

// Re-export commonly used structures and functions for convenience
pub use common::{parse_socket_addr, Result, TunnelError};
pub use tls::create_tls_acceptor;
pub use tunnel::{LocalServer, Relay, RemoteServer, SecureDialer, SessionCounter};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
