//! Configuration module
//!
//! This module handles tunnel configuration: the typed settings, loading them
//! from a JSON file or environment variables, layering sources on top of each
//! other and validating the result.

mod defaults;
mod error;
mod loader;
mod merger;
mod validator;

pub use self::defaults::{ENV_PREFIX, LISTEN_STR, TARGET_STR, CERT_PATH_STR, KEY_PATH_STR, LOG_LEVEL_STR};
pub use self::error::{ConfigError, Result};
pub use self::loader::ConfigLoader;
pub use self::merger::ConfigMerger;
pub use self::validator::ConfigValidator;

use log::info;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Custom deserializer for socket addresses
fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    crate::common::parse_socket_addr(&s).map_err(serde::de::Error::custom)
}

/// Which side of the tunnel this process runs
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    /// Accept plaintext TCP and forward it over TLS
    #[default]
    Local,
    /// Accept TLS and forward it as plaintext TCP
    Remote,
}

// Case-insensitive, same rules as `FromStr`
impl<'de> Deserialize<'de> for TunnelMode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TunnelMode::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for TunnelMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "client" => Ok(Self::Local),
            "remote" | "server" => Ok(Self::Remote),
            _ => Err(ConfigError::InvalidValue(
                "mode".to_string(),
                format!("Invalid tunnel mode: {}. Valid values are: local, remote", s),
            )),
        }
    }
}

/// Tunnel configuration
///
/// One struct serves both sides of the tunnel. Fields that only matter to one
/// side are ignored by the other:
///
/// - `cert` / `key` identify the remote side to its TLS clients
/// - `ca_cert` / `insecure_skip_verify` control how the local side verifies
///   the remote side
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct TunnelConfig {
    /// Side of the tunnel to run
    pub mode: TunnelMode,

    /// Listen address
    #[serde(deserialize_with = "deserialize_socket_addr")]
    pub listen: SocketAddr,

    /// Address to forward every accepted connection to (host:port)
    ///
    /// For the local side this is the remote side's TLS listener, for the
    /// remote side it is the plaintext destination.
    pub target: String,

    /// Server certificate chain (PEM), remote side only
    pub cert: PathBuf,

    /// Server private key (PEM), remote side only
    pub key: PathBuf,

    /// Extra trust anchors (PEM) used to verify the remote side
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Skip peer certificate and hostname verification (debug only)
    pub insecure_skip_verify: bool,

    /// Number of TLS sessions kept for resumption
    pub session_cache_capacity: usize,

    /// Relay buffer size per direction in bytes
    pub buffer_size: usize,

    /// Outbound connect and handshake timeout in seconds
    pub connect_timeout: u64,

    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            mode: TunnelMode::default(),
            listen: defaults::listen(),
            target: defaults::target(),
            cert: defaults::cert_path(),
            key: defaults::key_path(),
            ca_cert: None,
            insecure_skip_verify: defaults::insecure_skip_verify(),
            session_cache_capacity: defaults::session_cache_capacity(),
            buffer_size: defaults::buffer_size(),
            connect_timeout: defaults::connect_timeout(),
            log_level: defaults::log_level(),
        }
    }
}

// Implement AsRef<TunnelConfig> for TunnelConfig to simplify merge operations
impl AsRef<TunnelConfig> for TunnelConfig {
    fn as_ref(&self) -> &TunnelConfig {
        self
    }
}

impl TunnelConfig {
    /// Outbound connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Validate the configuration
    ///
    /// Returns the first fatal problem found. Non-fatal findings are reported
    /// by [`ConfigValidator::check_warnings`].
    pub fn validate(&self) -> Result<()> {
        validator::validate_config(self)
    }
}

/// Log the effective configuration
pub fn log_config(config: &TunnelConfig) {
    if !log::log_enabled!(log::Level::Info) {
        return;
    }

    info!("=== Tunnel Configuration ===");
    info!("  Mode: {}", config.mode);
    info!("  Listen address: {}", config.listen);
    info!("  Target address: {}", config.target);
    match config.mode {
        TunnelMode::Remote => {
            info!("  Certificate: {}", config.cert.display());
            info!("  Private key: {}", config.key.display());
        }
        TunnelMode::Local => {
            match config.ca_cert {
                Some(ref ca) => info!("  CA certificate: {}", ca.display()),
                None => info!("  CA certificate: system default"),
            }
            info!("  Peer verification: {}", if config.insecure_skip_verify { "disabled" } else { "enabled" });
            info!("  Session cache capacity: {}", config.session_cache_capacity);
        }
    }
    info!("  Buffer size: {} bytes", config.buffer_size);
    info!("  Connect timeout: {} seconds", config.connect_timeout);
    info!("  Log level: {}", config.log_level);
    info!("============================");
}
