//! Certificate material and parsed certificates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};
use crate::identity::Identity;

/// Loopback address always included in issued certificates.
pub const LOOPBACK_IP_SAN: &str = "127.0.0.1";

/// Body of a certificate issue request against a PKI role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    /// Certificate common name.
    pub common_name: String,
    /// Requested lifetime, in secret-store duration syntax.
    pub ttl: String,
    /// Comma-separated IP subject alternative names.
    pub ip_sans: String,
    /// Comma-separated DNS subject alternative names.
    pub alt_names: String,
}

impl IssueRequest {
    /// Builds the request for an identity: the service DNS name as common
    /// name, the bare service name as alt name and loopback as IP SAN.
    #[must_use]
    pub fn for_identity(identity: &Identity, cluster_domain: &str, ttl: impl Into<String>) -> Self {
        Self {
            common_name: identity.common_name(cluster_domain),
            ttl: ttl.into(),
            ip_sans: LOOPBACK_IP_SAN.to_string(),
            alt_names: identity.name.clone(),
        }
    }
}

/// A PEM-encoded private key, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct PrivateKeyPem(String);

impl PrivateKeyPem {
    /// Wraps a PEM string.
    #[must_use]
    pub const fn new(pem: String) -> Self {
        Self(pem)
    }

    /// Returns the PEM text.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PrivateKeyPem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKeyPem([REDACTED])")
    }
}

/// Certificate material issued by the PKI engine and stored per identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMaterial {
    /// Leaf certificate, PEM.
    pub certificate: String,
    /// Issuing CA certificate, PEM.
    pub issuing_ca: String,
    /// Private key, PEM.
    pub private_key: PrivateKeyPem,
    /// Serial number as reported by the PKI engine.
    pub serial_number: String,
    /// Key algorithm, e.g. `rsa`.
    pub private_key_type: String,
}

impl CertificateMaterial {
    /// Parses the leaf certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate PEM cannot be decoded.
    pub fn leaf(&self) -> Result<Certificate> {
        Certificate::from_pem(&self.certificate)
    }
}

/// The fields of an X.509 certificate the lifecycle needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    subject: Option<String>,
    serial: String,
    dns_names: Vec<String>,
}

impl Certificate {
    /// Creates a certificate record from its parts.
    #[must_use]
    pub const fn new(
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        subject: Option<String>,
        serial: String,
        dns_names: Vec<String>,
    ) -> Self {
        Self {
            not_before,
            not_after,
            subject,
            serial,
            dns_names,
        }
    }

    /// Parses the first certificate of a PEM document.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM envelope or the DER body is invalid.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (_, block) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
            .map_err(|e| Error::Pem(format!("failed to decode PEM: {e}")))?;

        if block.label != "CERTIFICATE" {
            return Err(Error::Pem(format!(
                "expected CERTIFICATE block, found {}",
                block.label
            )));
        }

        Self::from_der(&block.contents)
    }

    /// Parses a certificate from DER-encoded bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        use x509_parser::prelude::*;

        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::Parse(format!("failed to parse certificate: {e}")))?;

        let not_before = DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
            .ok_or_else(|| Error::Parse("invalid not_before timestamp".into()))?;
        let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| Error::Parse("invalid not_after timestamp".into()))?;

        let subject = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(String::from);

        Ok(Self {
            not_before,
            not_after,
            subject,
            serial: cert.raw_serial_as_string(),
            dns_names: extract_dns_names(&cert),
        })
    }

    /// Returns the certificate validity start time.
    #[must_use]
    pub const fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// Returns the certificate validity end time.
    #[must_use]
    pub const fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Returns the subject common name, if present.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Returns the serial number as colon-separated hex.
    #[must_use]
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Returns the DNS subject alternative names.
    #[must_use]
    pub fn dns_names(&self) -> &[String] {
        &self.dns_names
    }
}

fn extract_dns_names(cert: &x509_parser::certificate::X509Certificate) -> Vec<String> {
    let mut names = Vec::new();

    if let Ok(Some(san_ext)) = cert.subject_alternative_name() {
        for name in &san_ext.value.general_names {
            if let x509_parser::extensions::GeneralName::DNSName(dns) = name {
                names.push((*dns).to_string());
            }
        }
    }

    names
}
