//! Shared fixtures for the end-to-end scenarios.

#![allow(dead_code)]

use certvault_pki::{CertificateMaterial, PrivateKeyPem};
use chrono::{DateTime, Duration, Utc};

/// Self-signed material valid until `now + valid_for`.
pub fn material_expiring_in(valid_for: Duration, now: DateTime<Utc>) -> CertificateMaterial {
    let key = rcgen::KeyPair::generate().unwrap();
    let mut params = rcgen::CertificateParams::new(vec!["web".to_string()]).unwrap();
    params.not_before =
        time::OffsetDateTime::from_unix_timestamp((now - Duration::hours(1)).timestamp()).unwrap();
    params.not_after =
        time::OffsetDateTime::from_unix_timestamp((now + valid_for).timestamp()).unwrap();
    let cert = params.self_signed(&key).unwrap();
    CertificateMaterial {
        certificate: cert.pem(),
        issuing_ca: cert.pem(),
        private_key: PrivateKeyPem::new(key.serialize_pem()),
        serial_number: "0a".to_string(),
        private_key_type: "ec".to_string(),
    }
}
