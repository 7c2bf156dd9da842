//! Controller event loop.

use tracing::{debug, info, warn};

use certvault_store::SecretStore;

use crate::cluster::ClusterApi;
use crate::context::ControllerContext;
use crate::issuer::{issue_certificate, IssueOutcome};
use crate::revoker::revoke_certificate;
use crate::service::ServiceEvent;
use crate::watcher::EventSource;

/// Handles creation and deletion events one at a time, in the order the
/// watcher produced them, until the channel closes.
///
/// Failures are logged and the loop moves on to the next event; a failed
/// issuance is retried only when the Service is relabelled.
pub async fn run_event_loop<S, C>(ctx: ControllerContext<S, C>, mut source: EventSource)
where
    S: SecretStore,
    C: ClusterApi,
{
    while let Some(event) = source.recv().await {
        match event {
            ServiceEvent::Created(service) => match issue_certificate(&ctx, &service).await {
                Ok(IssueOutcome::Issued { identity, path, serial }) => {
                    info!(%identity, %path, %serial, "certificate issued");
                }
                Ok(IssueOutcome::Skipped(reason)) => {
                    debug!(name = %service.name, namespace = %service.namespace, ?reason, "creation event skipped");
                }
                Err(e) => warn!(error = %e, "certificate issuance failed"),
            },
            ServiceEvent::Deleted(service) => {
                if let Some(report) = revoke_certificate(&ctx, &service).await {
                    info!(
                        identity = %report.identity,
                        failures = report.failures(),
                        "certificate revoked"
                    );
                }
            }
        }
    }

    info!("event channel closed, controller loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ControllerSettings;
    use crate::fake::FakeCluster;
    use crate::labels::GENCERT_LABEL;
    use crate::service::ServiceMeta;
    use crate::watcher::event_channels;
    use certvault_store::fake::{FakeSecretStore, StoreOp};

    #[tokio::test]
    async fn processes_events_until_closed() {
        let web = ServiceMeta::new("web", "ns1").with_label(GENCERT_LABEL, "true");
        let ctx = ControllerContext::new(
            FakeSecretStore::new(),
            FakeCluster::new().with_service(web.clone()),
            ControllerSettings::default(),
        );
        let (sink, source) = event_channels();
        let handle = tokio::spawn(run_event_loop(ctx.clone(), source));

        assert!(sink.send(ServiceEvent::Created(web.clone())).await);
        assert!(sink.send(ServiceEvent::Created(ServiceMeta::new("plain", "ns1"))).await);
        let issued = web.with_label(GENCERT_LABEL, "false");
        assert!(sink.send(ServiceEvent::Deleted(issued)).await);
        drop(sink);

        handle.await.unwrap();

        assert_eq!(ctx.store.issued_count(), 1);
        assert_eq!(ctx.store.paths_for(StoreOp::Delete).len(), 3);
        assert_eq!(ctx.store.certificate_count(), 0);
    }

    #[tokio::test]
    async fn deletion_queued_after_creation_leaves_nothing_behind() {
        for _ in 0..50 {
            let requested = ServiceMeta::new("web", "ns1").with_label(GENCERT_LABEL, "true");
            let ctx = ControllerContext::new(
                FakeSecretStore::new(),
                FakeCluster::new(),
                ControllerSettings::default(),
            );
            let (sink, source) = event_channels();

            let queued = tokio::spawn(async move {
                sink.send(ServiceEvent::Created(requested.clone())).await
                    && sink
                        .send(ServiceEvent::Deleted(requested.with_label(GENCERT_LABEL, "false")))
                        .await
            });
            tokio::task::yield_now().await;
            run_event_loop(ctx.clone(), source).await;

            assert!(queued.await.unwrap());
            assert_eq!(ctx.store.certificate_count(), 0);
            assert_eq!(ctx.store.role_count(), 0);
            assert_eq!(ctx.store.policy_count(), 0);
        }
    }
}
