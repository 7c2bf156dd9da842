//! Kubernetes implementation of [`ClusterApi`].

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use tracing::{info, warn};

use crate::cluster::ClusterApi;
use crate::error::Result;
use crate::labels::{GENCERT_LABEL, LAST_CERT_UPDATE_LABEL, SERVICE_LABEL};
use crate::service::ServiceMeta;

/// Field manager recorded on every patch.
pub const FIELD_MANAGER: &str = "certvault-controller";

/// Cluster access through a kube [`Client`].
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: Option<String>,
}

impl KubeCluster {
    /// Creates a cluster handle, optionally scoped to one namespace.
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    /// Services API for the watched scope.
    pub fn services(&self) -> Api<Service> {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

impl ClusterApi for KubeCluster {
    async fn list_labelled_services(&self) -> Result<Vec<ServiceMeta>> {
        let services = self
            .services()
            .list(&ListParams::default().labels(GENCERT_LABEL))
            .await?;

        Ok(services
            .items
            .iter()
            .map(ServiceMeta::from_service)
            .filter(|meta| meta.lifecycle().is_present())
            .collect())
    }

    async fn set_lifecycle_label(&self, namespace: &str, name: &str, value: &str) -> Result<()> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "metadata": { "labels": { GENCERT_LABEL: value } }
        });

        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;

        info!(%namespace, %name, label = %value, "updated service label");
        Ok(())
    }

    async fn trigger_rollout(&self, service: &str, stamp: &str) -> Result<Vec<String>> {
        let all: Api<Deployment> = Api::all(self.client.clone());
        let deployments = all.list(&ListParams::default()).await?;

        let patch = serde_json::json!({
            "spec": { "template": { "metadata": { "labels": { LAST_CERT_UPDATE_LABEL: stamp } } } }
        });

        let mut rolled = Vec::new();
        for deployment in deployments.items {
            let serves = deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.template.metadata.as_ref())
                .and_then(|meta| meta.labels.as_ref())
                .and_then(|labels| labels.get(SERVICE_LABEL))
                .is_some_and(|value| value == service);
            if !serves {
                continue;
            }

            let (Some(name), Some(namespace)) =
                (deployment.metadata.name, deployment.metadata.namespace)
            else {
                continue;
            };

            let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
            match api
                .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
                .await
            {
                Ok(_) => {
                    info!(deployment = %name, %namespace, "rolling update initiated");
                    rolled.push(name);
                }
                Err(e) => {
                    warn!(deployment = %name, %namespace, error = %e, "rolling update failed");
                    return Err(e.into());
                }
            }
        }

        Ok(rolled)
    }
}
