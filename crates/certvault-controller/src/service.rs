//! Typed view of a watched Service.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Service;

use certvault_pki::Identity;

use crate::labels::{LifecycleLabel, GENCERT_LABEL};

/// The parts of a Service the controller acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMeta {
    /// Service name.
    pub name: String,
    /// Service namespace.
    pub namespace: String,
    /// Service labels.
    pub labels: BTreeMap<String, String>,
}

impl ServiceMeta {
    /// Creates metadata with no labels.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Extracts the metadata of a Service object.
    pub fn from_service(service: &Service) -> Self {
        let meta = &service.metadata;
        Self {
            name: meta.name.clone().unwrap_or_default(),
            namespace: meta.namespace.clone().unwrap_or_default(),
            labels: meta.labels.clone().unwrap_or_default(),
        }
    }

    /// State of the `gencert` label.
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleLabel {
        LifecycleLabel::parse(self.labels.get(GENCERT_LABEL).map(String::as_str))
    }

    /// The identity certificates are issued for.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(&self.name, &self.namespace)
    }

    /// Key identifying the object across watch events.
    #[must_use]
    pub fn key(&self) -> (String, String) {
        (self.namespace.clone(), self.name.clone())
    }
}

/// An event forwarded from the watcher to the controller loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// The Service appeared or was relabelled for issuance.
    Created(ServiceMeta),
    /// The Service was deleted.
    Deleted(ServiceMeta),
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn from_service_object() {
        let service = Service {
            metadata: ObjectMeta {
                name: Some("web".into()),
                namespace: Some("ns1".into()),
                labels: Some(BTreeMap::from([(GENCERT_LABEL.to_string(), "true".to_string())])),
                ..ObjectMeta::default()
            },
            ..Service::default()
        };

        let meta = ServiceMeta::from_service(&service);
        assert_eq!(meta.name, "web");
        assert_eq!(meta.namespace, "ns1");
        assert_eq!(meta.lifecycle(), LifecycleLabel::Requested);
        assert_eq!(meta.identity(), Identity::new("web", "ns1"));
    }

    #[test]
    fn unlabelled_service() {
        let meta = ServiceMeta::from_service(&Service::default());
        assert!(meta.name.is_empty());
        assert_eq!(meta.lifecycle(), LifecycleLabel::Absent);
    }
}
