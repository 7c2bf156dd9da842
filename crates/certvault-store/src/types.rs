//! Secret-store response envelopes.

use serde::{Deserialize, Serialize};

use certvault_pki::CertificateMaterial;

use crate::token::VaultToken;

/// Envelope around certificate material (`{"data": {...}}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateEnvelope {
    /// The material.
    pub data: CertificateMaterial,
}

/// Authentication block of an unwrapped secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretAuth {
    /// The usable client token.
    pub client_token: VaultToken,
    /// Token accessor.
    #[serde(default)]
    pub accessor: String,
    /// Policies attached to the token.
    #[serde(default)]
    pub policies: Vec<String>,
    /// Lease duration in seconds.
    #[serde(default)]
    pub lease_duration: u64,
    /// Whether the token can be renewed.
    #[serde(default)]
    pub renewable: bool,
}

/// A secret returned by unwrapping a wrapped credential.
///
/// This is also the format persisted in the bootstrap marker file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnwrappedSecret {
    /// Request identifier assigned by the secret store.
    #[serde(default)]
    pub request_id: String,
    /// Authentication data; absent if the wrapped secret was not a token.
    #[serde(default)]
    pub auth: Option<SecretAuth>,
}

impl UnwrappedSecret {
    /// Returns the client token, if the secret carries one.
    #[must_use]
    pub fn client_token(&self) -> Option<&VaultToken> {
        self.auth.as_ref().map(|auth| &auth.client_token)
    }
}
