//! Rotation sweep.
//!
//! Reads the certificate of every labelled Service and, when it is within
//! the rotation threshold of expiry, deletes the material, relabels the
//! Service `gencert=true` so the issuer runs again, and stamps the
//! Deployments serving it to roll their pods onto the new certificate.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use certvault_pki::paths::cert_path;
use certvault_pki::{Identity, RotationDecision};
use certvault_store::SecretStore;

use crate::cluster::ClusterApi;
use crate::context::ControllerContext;
use crate::error::Result;
use crate::labels::{rollout_stamp, REQUESTED};
use crate::service::ServiceMeta;

/// A rotated identity and the Deployments restarted for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotated {
    /// Identity rotated.
    pub identity: Identity,
    /// Seconds of validity left when rotation started.
    pub seconds_remaining: i64,
    /// Deployments stamped for a rollout.
    pub deployments: Vec<String>,
}

/// Summary of one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Identities whose certificate was rotated.
    pub rotated: Vec<Rotated>,
    /// Identities with enough validity left, and how much.
    pub healthy: Vec<(Identity, i64)>,
    /// Identities that could not be checked, with the reason.
    pub skipped: Vec<(Identity, String)>,
}

impl SweepReport {
    /// Number of identities examined.
    #[must_use]
    pub fn total(&self) -> usize {
        self.rotated.len() + self.healthy.len() + self.skipped.len()
    }
}

/// Checks every labelled Service once, as of `now`.
///
/// # Errors
///
/// Returns an error only if the Services cannot be listed; per-identity
/// failures are recorded in the report.
pub async fn run_sweep<S, C>(ctx: &ControllerContext<S, C>, now: DateTime<Utc>) -> Result<SweepReport>
where
    S: SecretStore,
    C: ClusterApi,
{
    let services = ctx.cluster.list_labelled_services().await?;
    let mut report = SweepReport::default();

    for service in services {
        let identity = service.identity();
        match check_service(ctx, &service, now).await {
            Ok(CheckResult::Healthy(seconds_remaining)) => {
                info!(%identity, seconds_remaining, "certificate valid");
                report.healthy.push((identity, seconds_remaining));
            }
            Ok(CheckResult::Rotated(rotated)) => report.rotated.push(rotated),
            Err(e) => {
                warn!(%identity, error = %e, "skipping certificate check");
                report.skipped.push((identity, e.to_string()));
            }
        }
    }

    info!(
        rotated = report.rotated.len(),
        healthy = report.healthy.len(),
        skipped = report.skipped.len(),
        "rotation sweep complete"
    );
    Ok(report)
}

enum CheckResult {
    Healthy(i64),
    Rotated(Rotated),
}

async fn check_service<S, C>(
    ctx: &ControllerContext<S, C>,
    service: &ServiceMeta,
    now: DateTime<Utc>,
) -> Result<CheckResult>
where
    S: SecretStore,
    C: ClusterApi,
{
    let identity = service.identity();
    let path = cert_path(&identity.namespace, &identity.name);
    let material = ctx.store.read_certificate(&path).await?;
    let leaf = material.leaf()?;

    let seconds_remaining = match ctx.settings.rotation.evaluate(&leaf, now) {
        RotationDecision::Healthy { seconds_remaining } => {
            return Ok(CheckResult::Healthy(seconds_remaining));
        }
        RotationDecision::Rotate { seconds_remaining } => seconds_remaining,
    };

    info!(%identity, seconds_remaining, "certificate within rotation threshold, rotating");

    if let Err(e) = ctx.store.delete(&path).await {
        warn!(%identity, %path, error = %e, "failed to delete expiring certificate");
    }

    ctx.cluster
        .set_lifecycle_label(&identity.namespace, &identity.name, REQUESTED)
        .await?;

    let deployments = ctx
        .cluster
        .trigger_rollout(&identity.name, &rollout_stamp(now))
        .await?;

    Ok(CheckResult::Rotated(Rotated {
        identity,
        seconds_remaining,
        deployments,
    }))
}

/// Runs a sweep every `period` until the task is dropped.
pub async fn run_rotation_loop<S, C>(ctx: ControllerContext<S, C>, period: Duration)
where
    S: SecretStore,
    C: ClusterApi,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if let Err(e) = run_sweep(&ctx, Utc::now()).await {
            warn!(error = %e, "rotation sweep failed");
        }
    }
}
