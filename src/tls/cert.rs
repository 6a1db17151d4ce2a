//! Certificate inspection helpers
//!
//! Used at startup to log which identity the remote side presents.

use openssl::hash::MessageDigest;
use openssl::x509::X509;
use std::fs;
use std::path::Path;

use crate::common::{Result, TunnelError};

/// Load the first certificate of a PEM file
pub fn load_cert(cert_path: &Path) -> Result<X509> {
    let pem = fs::read(cert_path)?;
    X509::from_pem(&pem)
        .map_err(|e| TunnelError::Certificate(format!("{}: {}", cert_path.display(), e)))
}

/// Get certificate subject as `key=value` pairs joined by commas
pub fn get_cert_subject(cert_path: &Path) -> Result<String> {
    let cert = load_cert(cert_path)?;

    let parts: Vec<String> = cert
        .subject_name()
        .entries()
        .map(|entry| {
            let key = entry.object().nid().short_name().unwrap_or("?");
            let value = String::from_utf8_lossy(entry.data().as_slice());
            format!("{}={}", key, value)
        })
        .collect();

    Ok(parts.join(", "))
}

/// Get the SHA-256 fingerprint of a certificate as colon-separated hex
pub fn get_cert_fingerprint(cert_path: &Path) -> Result<String> {
    let cert = load_cert(cert_path)?;
    let digest = cert.digest(MessageDigest::sha256())?;

    Ok(digest
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::nid::Nid;
    use openssl::pkey::PKey;
    use openssl::x509::{X509Builder, X509NameBuilder};

    fn write_test_cert(dir: &Path, subject: &[(&str, &str)]) -> std::path::PathBuf {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let pkey = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        for (field, value) in subject {
            name.append_entry_by_text(field, value).unwrap();
        }
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        builder.sign(&pkey, MessageDigest::sha256()).unwrap();

        let path = dir.join("cert.pem");
        fs::write(&path, builder.build().to_pem().unwrap()).unwrap();
        path
    }

    #[test]
    fn test_subject_and_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_cert(dir.path(), &[("CN", "tunnel.test")]);

        let subject = get_cert_subject(&path).unwrap();
        assert_eq!(subject, "CN=tunnel.test");

        let fingerprint = get_cert_fingerprint(&path).unwrap();
        // 32 bytes as hex pairs plus 31 separators
        assert_eq!(fingerprint.len(), 32 * 2 + 31);
        assert!(fingerprint.contains(':'));
    }

    #[test]
    fn test_subject_keeps_entry_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_cert(dir.path(), &[("C", "DE"), ("O", "Tünnel AG"), ("CN", "tunnel.test")]);

        let subject = get_cert_subject(&path).unwrap();
        assert_eq!(subject, "C=DE, O=Tünnel AG, CN=tunnel.test");
    }

    #[test]
    fn test_missing_cert() {
        assert!(load_cert(Path::new("no/such/cert.pem")).is_err());
    }
}
