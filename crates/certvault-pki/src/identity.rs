//! Workload identity and DNS naming.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The `(name, namespace)` pair a certificate is issued for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Service name, unique within its namespace.
    pub name: String,
    /// Namespace the service lives in.
    pub namespace: String,
}

impl Identity {
    /// Creates a new identity.
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Returns the certificate common name for this identity.
    #[must_use]
    pub fn common_name(&self, cluster_domain: &str) -> String {
        service_domain_name(&self.name, &self.namespace, cluster_domain)
    }

    /// Checks that both fields are usable as secret-store path segments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if a field is empty or contains a
    /// path separator.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("name", &self.name), ("namespace", &self.namespace)] {
            if value.is_empty() {
                return Err(Error::InvalidIdentity(format!("{field} cannot be empty")));
            }
            if value.contains('/') {
                return Err(Error::InvalidIdentity(format!(
                    "{field} '{value}' must not contain '/'"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Builds the in-cluster DNS name of a service: `name.namespace.svc.domain`.
#[must_use]
pub fn service_domain_name(name: &str, namespace: &str, domain: &str) -> String {
    format!("{name}.{namespace}.svc.{domain}")
}
