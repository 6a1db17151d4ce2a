//! Test for configuration priority order
//!
//! Command line > environment variables > configuration file > defaults

use serial_test::serial;
use std::env;
use std::fs;

use tls_tunnel::config::{ConfigLoader, ConfigMerger, ConfigValidator, TunnelConfig, TunnelMode};

const VARS: [&str; 4] = [
    "TLS_TUNNEL_TARGET",
    "TLS_TUNNEL_LOG_LEVEL",
    "TLS_TUNNEL_BUFFER_SIZE",
    "TLS_TUNNEL_CONNECT_TIMEOUT",
];

#[test]
#[serial]
fn test_config_priority() {
    let dir = tempfile::tempdir().unwrap();
    let config_file = dir.path().join("tunnel.json");
    fs::write(&config_file, r#"{
        "mode": "local",
        "listen": "127.0.0.1:1080",
        "target": "10.0.0.1:443",
        "log_level": "info",
        "buffer_size": 8192,
        "connect_timeout": 10,
        "session_cache_capacity": 64
    }"#).unwrap();

    env::set_var("TLS_TUNNEL_TARGET", "10.0.0.2:8443");
    env::set_var("TLS_TUNNEL_LOG_LEVEL", "debug");
    env::set_var("TLS_TUNNEL_BUFFER_SIZE", "16384");
    let from_env = TunnelConfig::from_env();
    for var in VARS {
        env::remove_var(var);
    }

    // what the command line sets explicitly
    let cli = TunnelConfig {
        log_level: "trace".to_string(),
        ..TunnelConfig::default()
    };

    let config = TunnelConfig::default()
        .merge(TunnelConfig::from_file(&config_file).unwrap())
        .merge(from_env.unwrap())
        .merge(cli);

    // command line beats environment
    assert_eq!(config.log_level, "trace");
    // environment beats file
    assert_eq!(config.target, "10.0.0.2:8443");
    assert_eq!(config.buffer_size, 16384);
    // file beats defaults
    assert_eq!(config.listen.port(), 1080);
    assert_eq!(config.connect_timeout, 10);
    assert_eq!(config.session_cache_capacity, 64);
    // untouched
    assert_eq!(config.mode, TunnelMode::Local);
    assert!(!config.insecure_skip_verify);

    assert!(config.validate().is_ok());
    assert!(config.check_warnings().is_empty());
}

#[test]
#[serial]
fn test_env_can_disable_verification_with_warning() {
    env::set_var("TLS_TUNNEL_INSECURE_SKIP_VERIFY", "true");
    let from_env = TunnelConfig::from_env();
    env::remove_var("TLS_TUNNEL_INSECURE_SKIP_VERIFY");

    let config = TunnelConfig::default().merge(from_env.unwrap());
    assert!(config.insecure_skip_verify);

    let warnings = config.check_warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("verification is disabled"));
}

#[test]
fn test_remote_mode_requires_identity_files() {
    let config = TunnelConfig {
        mode: TunnelMode::Remote,
        cert: "no/such/server.crt".into(),
        key: "no/such/server.key".into(),
        ..TunnelConfig::default()
    };

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("no/such/server.crt"));
}
