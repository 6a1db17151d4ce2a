//! Configuration merging functionality
//!
//! This module provides functionality for layering configurations from
//! different sources.

use super::TunnelConfig;

/// Trait for merging configurations
pub trait ConfigMerger {
    /// Merge another configuration into this one
    ///
    /// Values from `other` override values in `self` when they differ from
    /// the defaults, so `other` is the higher priority source.
    fn merge(&self, other: impl AsRef<Self>) -> Self where Self: Sized;
}

impl ConfigMerger for TunnelConfig {
    fn merge(&self, other: impl AsRef<Self>) -> Self {
        let other = other.as_ref();
        let default = Self::default();

        fn merge_field<T: Clone + PartialEq>(self_val: &T, other_val: &T, default_val: &T) -> T {
            if other_val != default_val {
                other_val.clone()
            } else {
                self_val.clone()
            }
        }

        fn merge_option<T: Clone>(self_val: &Option<T>, other_val: &Option<T>) -> Option<T> {
            if other_val.is_some() {
                other_val.clone()
            } else {
                self_val.clone()
            }
        }

        Self {
            mode: merge_field(&self.mode, &other.mode, &default.mode),
            listen: merge_field(&self.listen, &other.listen, &default.listen),
            target: merge_field(&self.target, &other.target, &default.target),
            cert: merge_field(&self.cert, &other.cert, &default.cert),
            key: merge_field(&self.key, &other.key, &default.key),
            ca_cert: merge_option(&self.ca_cert, &other.ca_cert),
            insecure_skip_verify: merge_field(
                &self.insecure_skip_verify,
                &other.insecure_skip_verify,
                &default.insecure_skip_verify,
            ),
            session_cache_capacity: merge_field(
                &self.session_cache_capacity,
                &other.session_cache_capacity,
                &default.session_cache_capacity,
            ),
            buffer_size: merge_field(&self.buffer_size, &other.buffer_size, &default.buffer_size),
            connect_timeout: merge_field(&self.connect_timeout, &other.connect_timeout, &default.connect_timeout),
            log_level: merge_field(&self.log_level, &other.log_level, &default.log_level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TunnelMode;
    use std::path::PathBuf;

    #[test]
    fn test_merge_prefers_non_default_values() {
        let mut file = TunnelConfig::default();
        file.mode = TunnelMode::Remote;
        file.target = "10.1.1.1:80".to_string();
        file.buffer_size = 1024;

        let mut env = TunnelConfig::default();
        env.target = "10.2.2.2:80".to_string();
        env.ca_cert = Some(PathBuf::from("ca.pem"));

        let merged = file.merge(&env);

        assert_eq!(merged.mode, TunnelMode::Remote, "kept from lower layer");
        assert_eq!(merged.target, "10.2.2.2:80", "overridden by higher layer");
        assert_eq!(merged.buffer_size, 1024);
        assert_eq!(merged.ca_cert, Some(PathBuf::from("ca.pem")));
    }

    #[test]
    fn test_merge_with_default_is_identity() {
        let mut config = TunnelConfig::default();
        config.connect_timeout = 5;
        config.insecure_skip_verify = true;

        assert_eq!(config.merge(TunnelConfig::default()), config);
    }
}
