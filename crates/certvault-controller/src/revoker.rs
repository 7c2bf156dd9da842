//! Certificate revocation on Service deletion.

use tracing::{info, warn};

use certvault_pki::paths::{cert_path, pki_role_path, policy_path};
use certvault_pki::Identity;
use certvault_store::{SecretStore, StoreError};

use crate::context::ControllerContext;
use crate::service::ServiceMeta;

/// Outcome of each deletion attempted for one identity.
#[derive(Debug)]
pub struct RevocationReport {
    /// Identity revoked.
    pub identity: Identity,
    /// Deleting the certificate material.
    pub certificate: Result<(), StoreError>,
    /// Deleting the PKI role.
    pub role: Result<(), StoreError>,
    /// Deleting the access policy.
    pub policy: Result<(), StoreError>,
}

impl RevocationReport {
    /// Returns true if all three deletions succeeded.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.certificate.is_ok() && self.role.is_ok() && self.policy.is_ok()
    }

    /// Number of failed deletions.
    #[must_use]
    pub fn failures(&self) -> usize {
        [&self.certificate, &self.role, &self.policy]
            .iter()
            .filter(|result| result.is_err())
            .count()
    }
}

/// Handles one deletion event.
///
/// Returns `None` without touching the store when the Service was never
/// labelled or has no name. Otherwise all three deletions are attempted,
/// whatever the outcome of the others.
pub async fn revoke_certificate<S, C>(
    ctx: &ControllerContext<S, C>,
    service: &ServiceMeta,
) -> Option<RevocationReport>
where
    S: SecretStore,
{
    if service.name.is_empty() || !service.lifecycle().is_present() {
        return None;
    }

    let identity = service.identity();
    let certificate = delete_logged(ctx, &identity, "certificate", &cert_path(&identity.namespace, &identity.name)).await;
    let role = delete_logged(ctx, &identity, "pki role", &pki_role_path(&identity.name)).await;
    let policy = delete_logged(ctx, &identity, "policy", &policy_path(&identity.name)).await;

    Some(RevocationReport {
        identity,
        certificate,
        role,
        policy,
    })
}

async fn delete_logged<S, C>(
    ctx: &ControllerContext<S, C>,
    identity: &Identity,
    what: &str,
    path: &str,
) -> Result<(), StoreError>
where
    S: SecretStore,
{
    let result = ctx.store.delete(path).await;
    match &result {
        Ok(()) => info!(%identity, %path, "{what} deleted"),
        Err(e) => warn!(%identity, %path, error = %e, "{what} delete failed"),
    }
    result
}
