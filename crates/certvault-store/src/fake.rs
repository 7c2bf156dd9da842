//! In-memory secret store for tests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use certvault_pki::paths::{cert_issue_path, pki_role_path, policy_path};
use certvault_pki::{AccessPolicy, CertificateMaterial, IssueRequest, PkiRole, PrivateKeyPem};

use crate::error::{Result, StoreError};
use crate::SecretStore;

/// Kind of secret-store operation, for call recording and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `create_role`.
    CreateRole,
    /// `create_policy`.
    CreatePolicy,
    /// `issue_certificate`.
    Issue,
    /// `write_certificate`.
    Write,
    /// `read_certificate`.
    Read,
    /// `delete`.
    Delete,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    /// Operation performed.
    pub op: StoreOp,
    /// Path it targeted.
    pub path: String,
}

/// Failure to inject for an `(operation, path)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The store cannot be reached.
    Unavailable,
    /// 403.
    Forbidden,
    /// 404.
    NotFound,
    /// 500.
    ServerError,
}

impl Failure {
    fn into_error(self, path: &str) -> StoreError {
        match self {
            Self::Unavailable => StoreError::Connectivity {
                path: path.to_string(),
                message: "connection refused".to_string(),
            },
            Self::Forbidden => StoreError::Forbidden(path.to_string()),
            Self::NotFound => StoreError::NotFound(path.to_string()),
            Self::ServerError => StoreError::UnexpectedStatus {
                status: 500,
                path: path.to_string(),
                body: "injected failure".to_string(),
            },
        }
    }
}

type IssueFn = Arc<dyn Fn(&IssueRequest) -> CertificateMaterial + Send + Sync>;

#[derive(Default)]
struct FakeState {
    roles: HashMap<String, PkiRole>,
    policies: HashMap<String, AccessPolicy>,
    certificates: HashMap<String, CertificateMaterial>,
    calls: Vec<StoreCall>,
    failures: HashMap<(StoreOp, String), Failure>,
    issued: usize,
    issuer: Option<IssueFn>,
}

/// An in-memory [`SecretStore`] that records calls and can inject failures.
///
/// Roles, policies and certificates are keyed by their secret-store path,
/// so writing twice to the same path overwrites, as the real store does.
#[derive(Default)]
pub struct FakeSecretStore {
    state: Mutex<FakeState>,
}

impl std::fmt::Debug for FakeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FakeSecretStore")
            .field("roles", &state.roles.len())
            .field("policies", &state.policies.len())
            .field("certificates", &state.certificates.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

impl FakeSecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds certificate material at `path`.
    #[must_use]
    pub fn with_certificate(self, path: impl Into<String>, material: CertificateMaterial) -> Self {
        self.state.lock().certificates.insert(path.into(), material);
        self
    }

    /// Replaces the material returned by `issue_certificate`.
    #[must_use]
    pub fn with_issuer<F>(self, issuer: F) -> Self
    where
        F: Fn(&IssueRequest) -> CertificateMaterial + Send + Sync + 'static,
    {
        self.state.lock().issuer = Some(Arc::new(issuer));
        self
    }

    /// Makes `op` on `path` fail with `failure` until cleared.
    pub fn fail(&self, op: StoreOp, path: impl Into<String>, failure: Failure) {
        self.state.lock().failures.insert((op, path.into()), failure);
    }

    /// Removes an injected failure.
    pub fn clear_failure(&self, op: StoreOp, path: &str) {
        self.state.lock().failures.remove(&(op, path.to_string()));
    }

    /// Returns every recorded call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().calls.clone()
    }

    /// Returns the paths targeted by `op`, in order.
    #[must_use]
    pub fn paths_for(&self, op: StoreOp) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.op == op)
            .map(|call| call.path.clone())
            .collect()
    }

    /// Returns the material stored at `path`.
    #[must_use]
    pub fn certificate(&self, path: &str) -> Option<CertificateMaterial> {
        self.state.lock().certificates.get(path).cloned()
    }

    /// Returns the role named `name`.
    #[must_use]
    pub fn role(&self, name: &str) -> Option<PkiRole> {
        self.state.lock().roles.get(&pki_role_path(name)).cloned()
    }

    /// Returns the policy named `name`.
    #[must_use]
    pub fn policy(&self, name: &str) -> Option<AccessPolicy> {
        self.state.lock().policies.get(&policy_path(name)).cloned()
    }

    /// Number of stored certificates.
    #[must_use]
    pub fn certificate_count(&self) -> usize {
        self.state.lock().certificates.len()
    }

    /// Number of stored roles.
    #[must_use]
    pub fn role_count(&self) -> usize {
        self.state.lock().roles.len()
    }

    /// Number of stored policies.
    #[must_use]
    pub fn policy_count(&self) -> usize {
        self.state.lock().policies.len()
    }

    /// Number of successful issuances.
    #[must_use]
    pub fn issued_count(&self) -> usize {
        self.state.lock().issued
    }

    fn record(&self, op: StoreOp, path: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(StoreCall {
            op,
            path: path.to_string(),
        });
        match state.failures.get(&(op, path.to_string())) {
            Some(failure) => Err(failure.into_error(path)),
            None => Ok(()),
        }
    }
}

fn placeholder_material(request: &IssueRequest, serial: usize) -> CertificateMaterial {
    CertificateMaterial {
        certificate: format!("certificate for {}", request.common_name),
        issuing_ca: "issuing ca".to_string(),
        private_key: PrivateKeyPem::new(format!("private key for {}", request.common_name)),
        serial_number: format!("{serial:02x}"),
        private_key_type: "rsa".to_string(),
    }
}

impl SecretStore for FakeSecretStore {
    async fn create_role(&self, name: &str, role: &PkiRole) -> Result<()> {
        let path = pki_role_path(name);
        self.record(StoreOp::CreateRole, &path)?;
        self.state.lock().roles.insert(path, role.clone());
        Ok(())
    }

    async fn create_policy(&self, policy: &AccessPolicy) -> Result<()> {
        let path = policy_path(&policy.name);
        self.record(StoreOp::CreatePolicy, &path)?;
        self.state.lock().policies.insert(path, policy.clone());
        Ok(())
    }

    async fn issue_certificate(
        &self,
        role: &str,
        request: &IssueRequest,
    ) -> Result<CertificateMaterial> {
        let path = cert_issue_path(role);
        self.record(StoreOp::Issue, &path)?;

        let mut state = self.state.lock();
        if !state.roles.contains_key(&pki_role_path(role)) {
            return Err(StoreError::UnexpectedStatus {
                status: 400,
                path,
                body: format!("unknown role: {role}"),
            });
        }
        state.issued += 1;
        let material = match &state.issuer {
            Some(issuer) => issuer(request),
            None => placeholder_material(request, state.issued),
        };
        Ok(material)
    }

    async fn write_certificate(&self, path: &str, material: &CertificateMaterial) -> Result<()> {
        self.record(StoreOp::Write, path)?;
        self.state
            .lock()
            .certificates
            .insert(path.to_string(), material.clone());
        Ok(())
    }

    async fn read_certificate(&self, path: &str) -> Result<CertificateMaterial> {
        self.record(StoreOp::Read, path)?;
        self.state
            .lock()
            .certificates
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.record(StoreOp::Delete, path)?;
        let mut state = self.state.lock();
        state.certificates.remove(path);
        state.roles.remove(path);
        state.policies.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certvault_pki::Identity;

    #[tokio::test]
    async fn issue_requires_role() {
        let store = FakeSecretStore::new();
        let request = IssueRequest::for_identity(&Identity::new("web", "ns1"), "cluster.local", "1h");

        assert!(store.issue_certificate("web", &request).await.is_err());

        store
            .create_role("web", &PkiRole::for_cluster_domain("cluster.local"))
            .await
            .unwrap();
        let material = store.issue_certificate("web", &request).await.unwrap();
        assert_eq!(material.certificate, "certificate for web.ns1.svc.cluster.local");
        assert_eq!(store.issued_count(), 1);
    }

    #[tokio::test]
    async fn injected_failure_is_recorded_and_returned() {
        let store = FakeSecretStore::new();
        store.fail(StoreOp::Delete, "pki/roles/web", Failure::ServerError);

        assert!(store.delete("pki/roles/web").await.is_err());
        assert!(store.delete("sys/policy/web").await.is_ok());
        assert_eq!(
            store.paths_for(StoreOp::Delete),
            ["pki/roles/web", "sys/policy/web"]
        );

        store.clear_failure(StoreOp::Delete, "pki/roles/web");
        assert!(store.delete("pki/roles/web").await.is_ok());
    }

    #[tokio::test]
    async fn delete_removes_any_kind_of_entry() {
        let store = FakeSecretStore::new();
        store
            .create_role("web", &PkiRole::for_cluster_domain("cluster.local"))
            .await
            .unwrap();
        store
            .create_policy(&AccessPolicy::for_identity(&Identity::new("web", "ns1")))
            .await
            .unwrap();

        store.delete("pki/roles/web").await.unwrap();
        store.delete("sys/policy/web").await.unwrap();
        assert_eq!(store.role_count(), 0);
        assert_eq!(store.policy_count(), 0);
    }
}
