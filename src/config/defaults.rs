//! Default configuration values
//!
//! Single source of truth for defaults, shared by serde, the loaders and the
//! command line.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "TLS_TUNNEL_";

/// Default listen address as string
pub const LISTEN_STR: &str = "127.0.0.1:8080";

/// Default target address as string
pub const TARGET_STR: &str = "127.0.0.1:8443";

/// Default server certificate path as string
pub const CERT_PATH_STR: &str = "certs/server.crt";

/// Default server private key path as string
pub const KEY_PATH_STR: &str = "certs/server.key";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default listen address
pub fn listen() -> SocketAddr {
    // LISTEN_STR is a literal socket address
    SocketAddr::from_str(LISTEN_STR)
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8080)))
}

/// Default target address
pub fn target() -> String {
    TARGET_STR.to_string()
}

/// Default server certificate path
pub fn cert_path() -> PathBuf {
    PathBuf::from(CERT_PATH_STR)
}

/// Default server private key path
pub fn key_path() -> PathBuf {
    PathBuf::from(KEY_PATH_STR)
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Peer verification is on unless explicitly disabled
pub fn insecure_skip_verify() -> bool {
    false
}

/// Default number of cached TLS sessions
pub fn session_cache_capacity() -> usize {
    32
}

/// Default relay buffer size (32KB)
pub fn buffer_size() -> usize {
    32 * 1024
}

/// Default outbound connect timeout in seconds
pub fn connect_timeout() -> u64 {
    30
}
