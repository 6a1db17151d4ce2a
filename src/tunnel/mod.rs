//! Tunnel module
//!
//! Both sides of the tunnel and the pieces they share: session accounting,
//! the relay engine, the TLS dialer and a connection probe.

mod counter;
mod dial;
mod local;
pub mod probe;
mod relay;
mod remote;

pub use counter::{SessionCounter, SessionGuard};
pub use dial::{HandshakeInfo, SecureDialer};
pub use local::LocalServer;
pub use probe::{probe, Readiness};
pub use relay::{Direction, Endpoint, Relay, RelayStats, Transfer, DEFAULT_BUFFER_SIZE};
pub use remote::RemoteServer;
