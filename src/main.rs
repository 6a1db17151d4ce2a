//! TLS Tunnel Command Line Tool
//!
//! This binary runs either side of the tunnel.

use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

use tls_tunnel::common::{init_logger, parse_socket_addr, Result};
use tls_tunnel::config::{
    log_config, ConfigLoader, ConfigMerger, ConfigValidator, TunnelConfig, TunnelMode,
};
use tls_tunnel::tls::{create_tls_acceptor, get_cert_fingerprint, get_cert_subject, SessionCache};
use tls_tunnel::{LocalServer, RemoteServer, SecureDialer, SessionCounter, APP_NAME, VERSION};

/// TLS Tunnel: carry plaintext TCP over TLS between two hosts
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Side of the tunnel to run (local, remote)
    #[clap(short, long)]
    mode: Option<TunnelMode>,

    /// Listen address
    #[clap(short, long)]
    listen: Option<String>,

    /// Forward address: the remote side (local mode) or the destination (remote mode)
    #[clap(short, long)]
    target: Option<String>,

    /// Server certificate chain (remote mode)
    #[clap(long)]
    cert: Option<PathBuf>,

    /// Server private key (remote mode)
    #[clap(long)]
    key: Option<PathBuf>,

    /// CA certificate used to verify the remote side (local mode)
    #[clap(long)]
    ca_cert: Option<PathBuf>,

    /// Skip verification of the remote side's certificate (debug only)
    #[clap(long)]
    insecure: bool,

    /// Log level
    #[clap(long)]
    log_level: Option<String>,

    /// Load configuration from environment variables
    #[clap(long)]
    from_env: bool,

    /// Load configuration from a file
    #[clap(long)]
    config_file: Option<PathBuf>,
}

impl Args {
    /// Configuration holding only the values given on the command line
    fn to_config(&self) -> Result<TunnelConfig> {
        let mut config = TunnelConfig::default();

        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(ref listen) = self.listen {
            config.listen = parse_socket_addr(listen)?;
        }
        if let Some(ref target) = self.target {
            config.target = target.clone();
        }
        if let Some(ref cert) = self.cert {
            config.cert = cert.clone();
        }
        if let Some(ref key) = self.key {
            config.key = key.clone();
        }
        config.ca_cert = self.ca_cert.clone();
        config.insecure_skip_verify = self.insecure;
        if let Some(ref level) = self.log_level {
            config.log_level = level.clone();
        }

        Ok(config)
    }
}

/// Build the effective configuration, lowest to highest priority:
/// defaults, file, environment, command line
fn load_config(args: &Args) -> Result<TunnelConfig> {
    let mut config = TunnelConfig::default();

    if let Some(ref path) = args.config_file {
        config = config.merge(TunnelConfig::from_file(path)?);
    }
    if args.from_env {
        config = config.merge(TunnelConfig::from_env()?);
    }

    Ok(config.merge(args.to_config()?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;
    init_logger(&config.log_level);

    info!("Starting {} v{}", APP_NAME, VERSION);

    config.validate()?;
    for warning in config.check_warnings() {
        warn!("{}", warning);
    }
    log_config(&config);

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match config.mode {
        TunnelMode::Local => {
            let cache = Arc::new(SessionCache::new(config.session_cache_capacity));
            let dialer = Arc::new(SecureDialer::from_config(&config, cache)?);
            let server = LocalServer::from_config(
                &config,
                dialer,
                Arc::new(SessionCounter::new("local")),
            );

            info!("Local tunnel ready, press Ctrl+C to stop");
            tokio::select! {
                result = server.run() => result?,
                _ = shutdown => info!("Shutting down, {} sessions open", server.sessions().active()),
            }
        }
        TunnelMode::Remote => {
            match get_cert_subject(&config.cert) {
                Ok(subject) => info!("Certificate subject: {}", subject),
                Err(e) => warn!("Unable to get certificate subject: {}", e),
            }
            match get_cert_fingerprint(&config.cert) {
                Ok(fingerprint) => info!("Certificate fingerprint: {}", fingerprint),
                Err(e) => warn!("Unable to get certificate fingerprint: {}", e),
            }

            let tls_acceptor = create_tls_acceptor(&config.cert, &config.key).map_err(|e| {
                error!("Failed to load server identity: {}", e);
                e
            })?;
            let server = RemoteServer::from_config(
                &config,
                tls_acceptor,
                Arc::new(SessionCounter::new("remote")),
            );

            info!("Remote tunnel ready, press Ctrl+C to stop");
            tokio::select! {
                result = server.run() => result?,
                _ = shutdown => info!("Shutting down, {} sessions open", server.sessions().active()),
            }
        }
    }

    Ok(())
}
