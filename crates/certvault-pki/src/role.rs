//! PKI role parameters and access policies.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::identity::Identity;
use crate::paths::{cert_path, policy_rules};

/// Default maximum lifetime of certificates issued under a role.
pub const DEFAULT_ROLE_MAX_TTL: &str = "72h";

/// Parameters of the per-identity PKI role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkiRole {
    /// Allow any common name under the role.
    pub allow_any_name: bool,
    /// Domains the role may issue for.
    pub allowed_domains: String,
    /// Allow subdomains of `allowed_domains`.
    pub allow_subdomains: bool,
    /// Maximum certificate lifetime, in secret-store duration syntax.
    pub max_ttl: String,
    /// Reject common names that are not valid hostnames.
    pub enforce_hostnames: bool,
}

impl PkiRole {
    /// Creates the default role for services in `cluster_domain`.
    #[must_use]
    pub fn for_cluster_domain(cluster_domain: impl Into<String>) -> Self {
        Self {
            allow_any_name: true,
            allowed_domains: cluster_domain.into(),
            allow_subdomains: true,
            max_ttl: DEFAULT_ROLE_MAX_TTL.to_string(),
            enforce_hostnames: true,
        }
    }

    /// Overrides the maximum certificate lifetime.
    #[must_use]
    pub fn with_max_ttl(mut self, max_ttl: impl Into<String>) -> Self {
        self.max_ttl = max_ttl.into();
        self
    }

    /// Encodes the role as the request body the PKI engine expects.
    ///
    /// Every value is sent as a string.
    #[must_use]
    pub fn to_request_body(&self) -> Value {
        json!({
            "allow_any_name": self.allow_any_name.to_string(),
            "allowed_domains": self.allowed_domains,
            "allow_subdomains": self.allow_subdomains.to_string(),
            "max_ttl": self.max_ttl,
            "enforce_hostnames": self.enforce_hostnames.to_string(),
        })
    }
}

/// A read-only access policy scoped to one identity's certificate path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Policy name (the service name).
    pub name: String,
    /// HCL policy rules.
    pub rules: String,
}

impl AccessPolicy {
    /// Builds the policy granting read on the identity's certificate path.
    #[must_use]
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            name: identity.name.clone(),
            rules: policy_rules(&cert_path(&identity.namespace, &identity.name)),
        }
    }

    /// Encodes the policy as the request body the secret store expects.
    #[must_use]
    pub fn to_request_body(&self) -> Value {
        json!({ "rules": self.rules })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_role_parameters() {
        let role = PkiRole::for_cluster_domain("cluster.local");
        assert!(role.allow_any_name);
        assert!(role.allow_subdomains);
        assert!(role.enforce_hostnames);
        assert_eq!(role.max_ttl, "72h");
    }

    #[test]
    fn role_body_uses_string_values() {
        let body = PkiRole::for_cluster_domain("cluster.local")
            .with_max_ttl("24h")
            .to_request_body();
        assert_eq!(body["allow_any_name"], "true");
        assert_eq!(body["allowed_domains"], "cluster.local");
        assert_eq!(body["allow_subdomains"], "true");
        assert_eq!(body["max_ttl"], "24h");
        assert_eq!(body["enforce_hostnames"], "true");
    }

    #[test]
    fn policy_scopes_exactly_one_path() {
        let policy = AccessPolicy::for_identity(&Identity::new("web", "ns1"));
        assert_eq!(policy.name, "web");
        assert_eq!(
            policy.to_request_body()["rules"],
            "path \"secret/certs/ns1/web\" {\n  capabilities = [\"read\"]\n}"
        );
    }
}
