//! In-memory cluster for tests.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::cluster::ClusterApi;
use crate::error::{ControllerError, Result};
use crate::labels::GENCERT_LABEL;
use crate::service::ServiceMeta;

#[derive(Debug, Default)]
struct State {
    services: BTreeMap<(String, String), ServiceMeta>,
    /// Deployment name -> (pod template `service` label, stamps received).
    deployments: BTreeMap<String, (String, Vec<String>)>,
    fail_labels: bool,
}

/// Services and Deployments held in memory.
///
/// Label updates change the stored Service; rollouts record the stamp on
/// every Deployment serving the named Service.
#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    /// Creates an empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a Service.
    #[must_use]
    pub fn with_service(self, service: ServiceMeta) -> Self {
        self.state.lock().services.insert(service.key(), service);
        self
    }

    /// Adds a Deployment whose pod template is labelled `service=<service>`.
    #[must_use]
    pub fn with_deployment(self, name: &str, service: &str) -> Self {
        self.state
            .lock()
            .deployments
            .insert(name.to_string(), (service.to_string(), Vec::new()));
        self
    }

    /// Makes every later label update fail.
    pub fn fail_label_updates(&self) {
        self.state.lock().fail_labels = true;
    }

    /// Current state of a Service.
    pub fn service(&self, namespace: &str, name: &str) -> Option<ServiceMeta> {
        self.state
            .lock()
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Current `gencert` label of a Service.
    pub fn label(&self, namespace: &str, name: &str) -> Option<String> {
        self.service(namespace, name)
            .and_then(|s| s.labels.get(GENCERT_LABEL).cloned())
    }

    /// Rollout stamps a Deployment received, oldest first.
    pub fn stamps(&self, deployment: &str) -> Vec<String> {
        self.state
            .lock()
            .deployments
            .get(deployment)
            .map(|(_, stamps)| stamps.clone())
            .unwrap_or_default()
    }
}

impl ClusterApi for FakeCluster {
    async fn list_labelled_services(&self) -> Result<Vec<ServiceMeta>> {
        Ok(self
            .state
            .lock()
            .services
            .values()
            .filter(|s| s.lifecycle().is_present())
            .cloned()
            .collect())
    }

    async fn set_lifecycle_label(&self, namespace: &str, name: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_labels {
            return Err(ControllerError::Cluster("label update refused".into()));
        }
        let service = state
            .services
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ControllerError::Cluster(format!("service {namespace}/{name} not found")))?;
        service.labels.insert(GENCERT_LABEL.to_string(), value.to_string());
        Ok(())
    }

    async fn trigger_rollout(&self, service: &str, stamp: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        let mut rolled = Vec::new();
        for (name, (target, stamps)) in &mut state.deployments {
            if target == service {
                stamps.push(stamp.to_string());
                rolled.push(name.clone());
            }
        }
        Ok(rolled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rollout_stamps_only_matching_deployments() {
        let cluster = FakeCluster::new()
            .with_deployment("web-frontend", "web")
            .with_deployment("billing", "billing");

        let rolled = cluster.trigger_rollout("web", "01-01-2026T00.00.00").await.unwrap();

        assert_eq!(rolled, ["web-frontend"]);
        assert_eq!(cluster.stamps("web-frontend"), ["01-01-2026T00.00.00"]);
        assert!(cluster.stamps("billing").is_empty());
    }

    #[tokio::test]
    async fn label_update_requires_known_service() {
        let cluster = FakeCluster::new().with_service(ServiceMeta::new("web", "ns1"));

        assert!(cluster.set_lifecycle_label("ns1", "api", "true").await.is_err());
        cluster.set_lifecycle_label("ns1", "web", "true").await.unwrap();
        assert_eq!(cluster.label("ns1", "web").as_deref(), Some("true"));
        assert_eq!(cluster.list_labelled_services().await.unwrap().len(), 1);
    }
}
