//! Certificate issuance.
//!
//! For a Service labelled `gencert=true` the issuer runs, in order:
//! create the PKI role, create the access policy, issue a certificate,
//! write it to the identity's secret path and relabel the Service
//! `gencert=false`. The first failing step ends the attempt; nothing is
//! rolled back, and relabelling the Service `true` starts over.

use thiserror::Error;
use tracing::{debug, info, warn};

use certvault_pki::paths::cert_path;
use certvault_pki::{AccessPolicy, Identity, IssueRequest};
use certvault_store::{SecretStore, StoreError};

use crate::cluster::ClusterApi;
use crate::context::ControllerContext;
use crate::error::ControllerError;
use crate::labels::{LifecycleLabel, ISSUED};
use crate::service::ServiceMeta;

/// Step of the issuance sequence that failed.
#[derive(Debug, Error)]
pub enum IssueError {
    /// Creating the PKI role failed.
    #[error("role creation failed for {identity}: {source}")]
    Role {
        /// Identity being issued.
        identity: Identity,
        /// Cause.
        source: StoreError,
    },

    /// Creating the access policy failed.
    #[error("policy creation failed for {identity}: {source}")]
    Policy {
        /// Identity being issued.
        identity: Identity,
        /// Cause.
        source: StoreError,
    },

    /// The PKI engine refused to issue.
    #[error("certificate issue failed for {identity}: {source}")]
    Issue {
        /// Identity being issued.
        identity: Identity,
        /// Cause.
        source: StoreError,
    },

    /// Writing the material failed.
    #[error("certificate write failed for {identity}: {source}")]
    Write {
        /// Identity being issued.
        identity: Identity,
        /// Cause.
        source: StoreError,
    },

    /// Relabelling the Service failed.
    #[error("label update failed for {identity}: {source}")]
    Label {
        /// Identity being issued.
        identity: Identity,
        /// Cause.
        source: ControllerError,
    },
}

/// Why a creation event did not lead to issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The event carried no name.
    MissingName,
    /// The label is not `"true"`.
    NotRequested(LifecycleLabel),
}

/// Result of handling one creation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    /// A certificate was issued and stored at `path`.
    Issued {
        /// Identity issued for.
        identity: Identity,
        /// Secret path of the material.
        path: String,
        /// Serial number of the new certificate.
        serial: String,
    },
    /// No secret-store call was made.
    Skipped(SkipReason),
}

/// Handles one creation event.
///
/// # Errors
///
/// Returns the [`IssueError`] of the first step that failed.
pub async fn issue_certificate<S, C>(
    ctx: &ControllerContext<S, C>,
    service: &ServiceMeta,
) -> Result<IssueOutcome, IssueError>
where
    S: SecretStore,
    C: ClusterApi,
{
    if service.name.is_empty() {
        return Ok(IssueOutcome::Skipped(SkipReason::MissingName));
    }
    let label = service.lifecycle();
    if !label.is_requested() {
        debug!(name = %service.name, namespace = %service.namespace, ?label, "issuance not requested");
        return Ok(IssueOutcome::Skipped(SkipReason::NotRequested(label)));
    }

    let identity = service.identity();
    let settings = &ctx.settings;

    ctx.store
        .create_role(&identity.name, &settings.role)
        .await
        .map_err(|source| IssueError::Role {
            identity: identity.clone(),
            source,
        })?;
    info!(%identity, "pki role created");

    ctx.store
        .create_policy(&AccessPolicy::for_identity(&identity))
        .await
        .map_err(|source| IssueError::Policy {
            identity: identity.clone(),
            source,
        })?;
    info!(%identity, "policy created");

    let request = IssueRequest::for_identity(&identity, &settings.cluster_domain, &settings.pki_ttl);
    let material = ctx
        .store
        .issue_certificate(&identity.name, &request)
        .await
        .map_err(|source| IssueError::Issue {
            identity: identity.clone(),
            source,
        })?;

    let path = cert_path(&identity.namespace, &identity.name);
    ctx.store
        .write_certificate(&path, &material)
        .await
        .map_err(|source| IssueError::Write {
            identity: identity.clone(),
            source,
        })?;
    info!(%identity, %path, serial = %material.serial_number, "certificate written");

    ctx.cluster
        .set_lifecycle_label(&identity.namespace, &identity.name, ISSUED)
        .await
        .map_err(|source| {
            warn!(%identity, error = %source, "certificate stored but service not relabelled");
            IssueError::Label {
                identity: identity.clone(),
                source,
            }
        })?;

    Ok(IssueOutcome::Issued {
        identity,
        path,
        serial: material.serial_number.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ControllerSettings;
    use crate::fake::FakeCluster;
    use crate::labels::GENCERT_LABEL;
    use certvault_store::fake::{Failure, FakeSecretStore, StoreOp};

    fn requested(name: &str) -> ServiceMeta {
        ServiceMeta::new(name, "ns1").with_label(GENCERT_LABEL, "true")
    }

    fn context(service: ServiceMeta) -> ControllerContext<FakeSecretStore, FakeCluster> {
        ControllerContext::new(
            FakeSecretStore::new(),
            FakeCluster::new().with_service(service),
            ControllerSettings::default(),
        )
    }

    #[tokio::test]
    async fn issues_and_relabels() {
        let ctx = context(requested("web"));

        let outcome = issue_certificate(&ctx, &requested("web")).await.unwrap();
        assert!(matches!(
            outcome,
            IssueOutcome::Issued { ref path, .. } if path == "secret/certs/ns1/web"
        ));

        let role = ctx.store.role("web").unwrap();
        assert_eq!(role.allowed_domains, "cluster.local");
        assert!(ctx.store.policy("web").is_some());
        assert!(ctx.store.certificate("secret/certs/ns1/web").is_some());
        assert_eq!(ctx.cluster.label("ns1", "web").as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn unlabelled_service_is_skipped() {
        let service = ServiceMeta::new("web", "ns1");
        let ctx = context(service.clone());

        let outcome = issue_certificate(&ctx, &service).await.unwrap();
        assert_eq!(
            outcome,
            IssueOutcome::Skipped(SkipReason::NotRequested(LifecycleLabel::Absent))
        );
        assert!(ctx.store.calls().is_empty());
    }

    #[tokio::test]
    async fn nameless_service_is_skipped() {
        let ctx = context(requested("web"));
        let outcome = issue_certificate(&ctx, &requested("")).await.unwrap();
        assert_eq!(outcome, IssueOutcome::Skipped(SkipReason::MissingName));
        assert!(ctx.store.calls().is_empty());
    }

    #[tokio::test]
    async fn role_failure_stops_sequence() {
        let ctx = context(requested("web"));
        ctx.store.fail(StoreOp::CreateRole, "pki/roles/web", Failure::Forbidden);

        let err = issue_certificate(&ctx, &requested("web")).await.unwrap_err();
        assert!(matches!(err, IssueError::Role { .. }));
        assert_eq!(ctx.store.calls().len(), 1);
        assert_eq!(ctx.cluster.label("ns1", "web").as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn write_failure_keeps_label_requested() {
        let ctx = context(requested("web"));
        ctx.store.fail(StoreOp::Write, "secret/certs/ns1/web", Failure::ServerError);

        let err = issue_certificate(&ctx, &requested("web")).await.unwrap_err();
        assert!(matches!(err, IssueError::Write { .. }));
        assert_eq!(ctx.store.issued_count(), 1);
        assert_eq!(ctx.cluster.label("ns1", "web").as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn label_failure_is_reported_after_write() {
        let ctx = context(requested("web"));
        ctx.cluster.fail_label_updates();

        let err = issue_certificate(&ctx, &requested("web")).await.unwrap_err();
        assert!(matches!(err, IssueError::Label { .. }));
        assert!(ctx.store.certificate("secret/certs/ns1/web").is_some());
    }

    #[tokio::test]
    async fn reissue_overwrites_role_and_policy() {
        let ctx = context(requested("web"));
        issue_certificate(&ctx, &requested("web")).await.unwrap();
        issue_certificate(&ctx, &requested("web")).await.unwrap();

        assert_eq!(ctx.store.role_count(), 1);
        assert_eq!(ctx.store.policy_count(), 1);
        assert_eq!(ctx.store.certificate_count(), 1);
        assert_eq!(ctx.store.issued_count(), 2);
    }
}
