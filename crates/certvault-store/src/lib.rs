//! Secret-store client for certvault.
#![forbid(unsafe_code)]
//!
//! The [`SecretStore`] trait is the seam the controller is written against.
//! [`VaultClient`] implements it over the secret store's HTTP API using the
//! process token; [`WrappingClient`] performs the one unauthenticated call the
//! bootstrap needs, unwrapping a single-use wrapped credential.
//!
//! With the `testing` feature, [`fake::FakeSecretStore`] provides an
//! in-memory implementation that records every call.

pub mod client;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod token;
pub mod types;

use std::future::Future;

use certvault_pki::{AccessPolicy, CertificateMaterial, IssueRequest, PkiRole};

pub use client::{VaultClient, WrappingClient, VAULT_TOKEN_HEADER};
pub use error::{Result, StoreError};
pub use token::VaultToken;
pub use types::{SecretAuth, UnwrappedSecret};

/// Operations the certificate lifecycle performs against the secret store.
///
/// Paths are relative to `/v1/`; see [`certvault_pki::paths`].
pub trait SecretStore: Send + Sync {
    /// Creates (or overwrites) the PKI role `name`.
    fn create_role(
        &self,
        name: &str,
        role: &PkiRole,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Creates (or overwrites) an access policy.
    fn create_policy(&self, policy: &AccessPolicy) -> impl Future<Output = Result<()>> + Send;

    /// Issues a certificate under the PKI role `role`.
    fn issue_certificate(
        &self,
        role: &str,
        request: &IssueRequest,
    ) -> impl Future<Output = Result<CertificateMaterial>> + Send;

    /// Writes certificate material at `path`.
    fn write_certificate(
        &self,
        path: &str,
        material: &CertificateMaterial,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Reads certificate material from `path`.
    fn read_certificate(&self, path: &str)
    -> impl Future<Output = Result<CertificateMaterial>> + Send;

    /// Deletes whatever lives at `path` (secret, role or policy).
    fn delete(&self, path: &str) -> impl Future<Output = Result<()>> + Send;
}
