//! Cluster operations the controller performs.

use std::future::Future;

use crate::error::Result;
use crate::service::ServiceMeta;

/// Operations against the cluster API.
///
/// [`crate::k8s::KubeCluster`] implements this against a real API server;
/// with the `testing` feature, [`crate::fake::FakeCluster`] keeps everything
/// in memory.
pub trait ClusterApi: Send + Sync {
    /// Lists every Service carrying a non-empty `gencert` label.
    fn list_labelled_services(&self) -> impl Future<Output = Result<Vec<ServiceMeta>>> + Send;

    /// Sets the `gencert` label of a Service to `value`.
    fn set_lifecycle_label(
        &self,
        namespace: &str,
        name: &str,
        value: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Stamps every Deployment whose pod template is labelled
    /// `service=<service>` with `lastcertupdate=<stamp>`.
    ///
    /// Returns the names of the Deployments that were patched.
    fn trigger_rollout(
        &self,
        service: &str,
        stamp: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;
}
