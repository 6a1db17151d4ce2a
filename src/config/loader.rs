//! Configuration loading functionality
//!
//! This module provides functionality for loading configuration from a JSON
//! file or from prefixed environment variables.

use log::{debug, warn};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::defaults::ENV_PREFIX;
use super::error::{ConfigError, Result};
use super::TunnelConfig;

/// Trait for loading configuration from different sources
pub trait ConfigLoader {
    /// Load configuration from a JSON file
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> where Self: Sized;

    /// Load configuration from `TLS_TUNNEL_*` environment variables
    ///
    /// Unset variables keep their default value.
    fn from_env() -> Result<Self> where Self: Sized;
}

impl ConfigLoader for TunnelConfig {
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(path.to_path_buf(), e.to_string()))?;

        let config = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded configuration from {}", path.display());

        Ok(config)
    }

    fn from_env() -> Result<Self> {
        let get_env = |name: &str| -> Option<String> {
            env::var(format!("{}{}", ENV_PREFIX, name)).ok()
        };

        // Parse a variable, naming it in the error
        fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            value.parse::<T>().map_err(|e| ConfigError::InvalidValue(
                format!("{}{}", ENV_PREFIX, name),
                e.to_string(),
            ))
        }

        let mut config = Self::default();

        if let Some(value) = get_env("MODE") {
            config.mode = parse("MODE", &value)?;
        }
        if let Some(value) = get_env("LISTEN") {
            config.listen = crate::common::parse_socket_addr(&value)
                .map_err(|e| ConfigError::InvalidValue(format!("{}LISTEN", ENV_PREFIX), e.to_string()))?;
        }
        if let Some(value) = get_env("TARGET") {
            config.target = value;
        }
        if let Some(value) = get_env("CERT") {
            config.cert = PathBuf::from(value);
        }
        if let Some(value) = get_env("KEY") {
            config.key = PathBuf::from(value);
        }
        if let Some(value) = get_env("CA_CERT") {
            config.ca_cert = Some(PathBuf::from(value));
        }
        if let Some(value) = get_env("INSECURE_SKIP_VERIFY") {
            config.insecure_skip_verify = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(value) = get_env("SESSION_CACHE_CAPACITY") {
            config.session_cache_capacity = parse("SESSION_CACHE_CAPACITY", &value)?;
        }
        if let Some(value) = get_env("BUFFER_SIZE") {
            config.buffer_size = parse("BUFFER_SIZE", &value)?;
        }
        if let Some(value) = get_env("CONNECT_TIMEOUT") {
            config.connect_timeout = parse("CONNECT_TIMEOUT", &value)?;
        }
        if let Some(value) = get_env("LOG_LEVEL") {
            config.log_level = value;
        }

        if config == Self::default() {
            warn!("No {}* environment variables found", ENV_PREFIX);
        }

        Ok(config)
    }
}
