//! Shared controller context.

use std::sync::Arc;

use certvault_pki::{PkiRole, RotationPolicy};

/// Issuance and rotation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Cluster DNS domain used in common names.
    pub cluster_domain: String,
    /// TTL requested for each certificate.
    pub pki_ttl: String,
    /// Role created for each identity.
    pub role: PkiRole,
    /// When to rotate.
    pub rotation: RotationPolicy,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            cluster_domain: "cluster.local".to_string(),
            pki_ttl: "60m".to_string(),
            role: PkiRole::for_cluster_domain("cluster.local"),
            rotation: RotationPolicy::default(),
        }
    }
}

/// Everything a controller component needs, passed at construction.
///
/// The store client carries the secret-store token, so the token is fixed
/// for the lifetime of the context.
pub struct ControllerContext<S, C> {
    /// Secret store.
    pub store: Arc<S>,
    /// Cluster API.
    pub cluster: Arc<C>,
    /// Settings.
    pub settings: Arc<ControllerSettings>,
}

impl<S, C> ControllerContext<S, C> {
    /// Creates a context.
    pub fn new(store: S, cluster: C, settings: ControllerSettings) -> Self {
        Self {
            store: Arc::new(store),
            cluster: Arc::new(cluster),
            settings: Arc::new(settings),
        }
    }
}

impl<S, C> Clone for ControllerContext<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cluster: Arc::clone(&self.cluster),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<S, C> std::fmt::Debug for ControllerContext<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
