//! Shared helpers for the integration tests
//!
//! Every test gets a fresh self-signed identity and its own listeners on
//! ephemeral ports.

#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509NameBuilder};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use tls_tunnel::tls::{create_tls_acceptor, SessionCache};
use tls_tunnel::{LocalServer, RemoteServer, SecureDialer, SessionCounter};

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// A generated server identity, removed with the temporary directory
pub struct Identity {
    _dir: TempDir,
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Generate a self-signed identity for `localhost` and `127.0.0.1`
pub fn identity() -> Identity {
    let dir = tempfile::tempdir().unwrap();

    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let pkey = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "localhost").unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&pkey).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    let san = SubjectAlternativeName::new()
        .dns("localhost")
        .ip("127.0.0.1")
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(san).unwrap();
    builder.sign(&pkey, MessageDigest::sha256()).unwrap();

    let cert = dir.path().join("server.crt");
    let key = dir.path().join("server.key");
    fs::write(&cert, builder.build().to_pem().unwrap()).unwrap();
    fs::write(&key, pkey.private_key_to_pem_pkcs8().unwrap()).unwrap();

    Identity { _dir: dir, cert, key }
}

/// Plaintext destination: answers `PING` with `PONG`, echoes anything else,
/// closes after the client's end-of-stream
pub async fn ping_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut conn, _)) = listener.accept().await else { continue };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    let n = match conn.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    let reply: &[u8] = if &buf[..n] == b"PING" { b"PONG" } else { &buf[..n] };
                    if conn.write_all(reply).await.is_err() {
                        break;
                    }
                }
                let _ = conn.shutdown().await;
            });
        }
    });

    addr
}

/// Plaintext destination that closes every connection right after accepting
pub async fn closing_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            if let Ok((conn, _)) = listener.accept().await {
                drop(conn);
            }
        }
    });

    addr
}

/// An address nobody listens on
pub async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start a remote side forwarding to `target`
pub async fn start_remote(identity: &Identity, target: SocketAddr) -> (SocketAddr, Arc<SessionCounter>) {
    let acceptor = create_tls_acceptor(&identity.cert, &identity.key).unwrap();
    let sessions = Arc::new(SessionCounter::new("remote"));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = RemoteServer::new(addr, target.to_string(), acceptor, Arc::clone(&sessions))
        .with_connect_timeout(WAIT);
    tokio::spawn(async move { server.serve(listener).await });

    (addr, sessions)
}

/// A dialer trusting `identity`
pub fn dialer(identity: &Identity, cache: Arc<SessionCache>) -> Arc<SecureDialer> {
    Arc::new(SecureDialer::new(Some(identity.cert.as_path()), false, WAIT, cache).unwrap())
}

/// Start a local side forwarding to `remote`
pub async fn start_local(
    remote: SocketAddr,
    dialer: Arc<SecureDialer>,
    sessions: Arc<SessionCounter>,
) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = LocalServer::new(addr, remote.to_string(), dialer, sessions);
    tokio::spawn(async move { server.serve(listener).await });

    addr
}

/// Connect a plaintext client
pub async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.unwrap()
}

/// Poll `condition` until it holds, failing the test after [`WAIT`]
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in {:?}", WAIT);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
