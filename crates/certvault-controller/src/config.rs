//! Command-line configuration for the controller.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Args;

use certvault_pki::role::DEFAULT_ROLE_MAX_TTL;
use certvault_pki::{PkiRole, RotationPolicy};

use crate::context::ControllerSettings;
use crate::error::{ControllerError, Result};

/// Controller settings.
#[derive(Debug, Clone, Args)]
pub struct ControllerConfig {
    /// Secret store address
    #[arg(long, env = "VAULT_ADDR", default_value = "https://vault:8200")]
    pub vault_addr: String,

    /// Token controller address
    #[arg(long, env = "VAULT_CONTROLLER_ADDR", default_value = "http://vault-controller")]
    pub controller_addr: String,

    /// Name of this pod (pod.metadata.name)
    #[arg(long, env = "POD_NAME", default_value = "")]
    pub name: String,

    /// Namespace of this pod (pod.metadata.namespace)
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Cluster DNS domain
    #[arg(long, default_value = "cluster.local")]
    pub cluster_domain: String,

    /// TTL of issued certificates
    #[arg(long, default_value = "60m")]
    pub pki_ttl: String,

    /// Maximum TTL allowed by each PKI role
    #[arg(long, default_value = DEFAULT_ROLE_MAX_TTL)]
    pub role_max_ttl: String,

    /// Rotate certificates with at most this many minutes left
    #[arg(long, default_value_t = 1)]
    pub rotation_threshold_minutes: u64,

    /// Only watch Services in this namespace
    #[arg(long)]
    pub watch_namespace: Option<String>,

    /// Address the token broker listens on
    #[arg(long, default_value = "0.0.0.0:80")]
    pub broker_addr: SocketAddr,

    /// Seconds to wait for the token callback
    #[arg(long, default_value_t = 30)]
    pub callback_timeout_secs: u64,

    /// Use this secret-store token instead of the broker hand-off
    #[arg(long, env = "VAULT_TOKEN", hide_env_values = true)]
    pub vault_token: Option<String>,
}

impl ControllerConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.vault_addr.is_empty() {
            return Err(ControllerError::Config("vault-addr cannot be empty".to_string()));
        }

        if self.cluster_domain.is_empty() {
            return Err(ControllerError::Config("cluster-domain cannot be empty".to_string()));
        }

        if self.pki_ttl.is_empty() {
            return Err(ControllerError::Config("pki-ttl cannot be empty".to_string()));
        }

        if self.callback_timeout_secs == 0 {
            return Err(ControllerError::Config(
                "callback-timeout-secs must be greater than 0".to_string(),
            ));
        }

        if self.vault_token.is_none() && self.name.is_empty() {
            return Err(ControllerError::Config(
                "name is required to request a token".to_string(),
            ));
        }

        Ok(())
    }

    /// Issuance and rotation settings.
    #[must_use]
    pub fn settings(&self) -> ControllerSettings {
        ControllerSettings {
            cluster_domain: self.cluster_domain.clone(),
            pki_ttl: self.pki_ttl.clone(),
            role: PkiRole::for_cluster_domain(&self.cluster_domain)
                .with_max_ttl(&self.role_max_ttl),
            rotation: RotationPolicy::from_minutes(self.rotation_threshold_minutes),
        }
    }

    /// Callback timeout for the token hand-off.
    #[must_use]
    pub const fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}
