//! TLS handling module
//!
//! Server-side acceptor, certificate inspection and the client session cache.

mod acceptor;
mod cert;
pub mod session_cache;

pub use acceptor::create_tls_acceptor;
pub use cert::{get_cert_subject, get_cert_fingerprint, load_cert};
pub use session_cache::{SessionCache, SharedLru};
