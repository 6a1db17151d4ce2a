//! Configuration validator
//!
//! Fatal problems are returned as errors by [`validate_config`]; anything the
//! tunnel can still run with is reported by [`ConfigValidator::check_warnings`].

use std::path::Path;

use super::error::{ConfigError, Result};
use super::{TunnelConfig, TunnelMode};
use crate::common::{host_of, parse_socket_addr};

/// Validate the configuration
pub fn validate_config(config: &TunnelConfig) -> Result<()> {
    validate_network_settings(config)?;
    validate_tls_settings(config)?;
    validate_general_settings(config)?;
    Ok(())
}

/// Validate network settings
fn validate_network_settings(config: &TunnelConfig) -> Result<()> {
    if config.target.is_empty() || host_of(&config.target) == config.target {
        return Err(ConfigError::InvalidValue(
            "target".to_string(),
            format!("Target must be host:port, got '{}'", config.target),
        ));
    }

    // Only literal targets are compared, hostnames are resolved at dial time
    if let Ok(target) = config.target.parse::<std::net::SocketAddr>() {
        if target == config.listen {
            return Err(ConfigError::InvalidCombination(
                "Listen and target addresses must be different".to_string()
            ));
        }
    } else if parse_socket_addr(&config.target).is_err() {
        log::warn!("Target {} does not resolve now, it is resolved again on each dial", config.target);
    }

    Ok(())
}

/// Validate TLS material for the configured side
fn validate_tls_settings(config: &TunnelConfig) -> Result<()> {
    match config.mode {
        TunnelMode::Remote => {
            validate_file_exists(&config.cert)?;
            validate_file_exists(&config.key)?;
        }
        TunnelMode::Local => {
            if let Some(ref ca) = config.ca_cert {
                validate_file_exists(ca)?;
            }
        }
    }

    Ok(())
}

/// Validate general settings
fn validate_general_settings(config: &TunnelConfig) -> Result<()> {
    if config.buffer_size == 0 {
        return Err(ConfigError::InvalidValue(
            "buffer_size".to_string(),
            "Buffer size must be greater than 0".to_string()
        ));
    }

    if config.session_cache_capacity == 0 {
        return Err(ConfigError::InvalidValue(
            "session_cache_capacity".to_string(),
            "Session cache capacity must be greater than 0".to_string()
        ));
    }

    if config.connect_timeout == 0 {
        return Err(ConfigError::InvalidValue(
            "connect_timeout".to_string(),
            "Connect timeout must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate that a file exists
fn validate_file_exists(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    Ok(())
}

/// Configuration validator trait
pub trait ConfigValidator {
    /// Check configuration for warnings
    fn check_warnings(&self) -> Vec<String>;
}

impl ConfigValidator for TunnelConfig {
    fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match self.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => {
                warnings.push(format!("Invalid log level '{}', using default 'info'", level));
            }
        }

        if self.mode == TunnelMode::Local && self.insecure_skip_verify {
            if cfg!(debug_assertions) {
                warnings.push("Peer certificate verification is disabled".to_string());
            } else {
                warnings.push("Peer certificate verification is disabled in a release build".to_string());
            }
        }

        if self.mode == TunnelMode::Remote && (self.ca_cert.is_some() || self.insecure_skip_verify) {
            warnings.push("ca_cert and insecure_skip_verify only apply to the local side".to_string());
        }

        warnings
    }
}
