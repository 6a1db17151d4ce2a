//! TLS acceptor creation for the remote side

use log::{debug, info};
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};
use std::path::Path;

use crate::common::{Result, TunnelError};

/// Create the TLS acceptor presenting the server identity
///
/// `cert_path` may hold a full chain (leaf first). The private key must match
/// the leaf certificate.
///
/// # Example
///
/// ```no_run
/// # use std::path::Path;
/// # use tls_tunnel::tls::create_tls_acceptor;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let acceptor = create_tls_acceptor(
///     Path::new("certs/server.crt"),
///     Path::new("certs/server.key"),
/// )?;
/// # Ok(())
/// # }
/// ```
pub fn create_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<SslAcceptor> {
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;

    acceptor.set_certificate_chain_file(cert_path)
        .map_err(|e| TunnelError::Certificate(format!("{}: {}", cert_path.display(), e)))?;
    acceptor.set_private_key_file(key_path, SslFiletype::PEM)
        .map_err(|e| TunnelError::Certificate(format!("{}: {}", key_path.display(), e)))?;
    acceptor.check_private_key()
        .map_err(|e| TunnelError::Certificate(format!("key does not match certificate: {}", e)))?;

    debug!("Loaded server identity from {:?} and {:?}", cert_path, key_path);
    info!("TLS acceptor ready (session tickets enabled)");

    Ok(acceptor.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_identity_is_a_certificate_error() {
        let result = create_tls_acceptor(Path::new("missing.crt"), Path::new("missing.key"));
        assert!(matches!(result, Err(TunnelError::Certificate(_))));
    }
}
