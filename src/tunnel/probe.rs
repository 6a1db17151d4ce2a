//! Connection state probe for diagnostics

use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Observed state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// The peer has not closed its side (data may or may not be pending)
    pub readable: bool,
    /// Writes would not fail on a socket error
    pub writable: bool,
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "readable: {}, writable: {}", self.readable, self.writable)
    }
}

/// Check whether a connection can still be read from and written to
///
/// Waits at most `wait` for each check. Pending data is peeked, never
/// consumed. A read check that times out means the peer is idle but still
/// connected.
pub async fn probe(stream: &TcpStream, wait: Duration) -> Readiness {
    let mut byte = [0u8; 1];
    let readable = match timeout(wait, stream.peek(&mut byte)).await {
        Ok(Ok(0)) | Ok(Err(_)) => false,
        Ok(Ok(_)) | Err(_) => true,
    };

    let writable = match timeout(wait, stream.writable()).await {
        Ok(Ok(())) => matches!(stream.take_error(), Ok(None)),
        Ok(Err(_)) | Err(_) => false,
    };

    Readiness { readable, writable }
}
