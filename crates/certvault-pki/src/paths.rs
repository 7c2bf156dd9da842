//! Secret-store paths derived from an identity.
//!
//! All paths are relative to the `/v1/` prefix of the secret-store API.

/// Path of the PKI role for a service.
#[must_use]
pub fn pki_role_path(name: &str) -> String {
    format!("pki/roles/{name}")
}

/// Path used to issue a certificate against a service's role.
#[must_use]
pub fn cert_issue_path(name: &str) -> String {
    format!("pki/issue/{name}")
}

/// Path of the access policy for a service.
#[must_use]
pub fn policy_path(name: &str) -> String {
    format!("sys/policy/{name}")
}

/// Path where a service's certificate material is stored.
#[must_use]
pub fn cert_path(namespace: &str, name: &str) -> String {
    format!("secret/certs/{namespace}/{name}")
}

/// Path of the response-unwrapping endpoint.
pub const UNWRAP_PATH: &str = "sys/wrapping/unwrap";

/// Builds a read-only policy rule for a single secret path.
#[must_use]
pub fn policy_rules(cert_path: &str) -> String {
    format!("path \"{cert_path}\" {{\n  capabilities = [\"read\"]\n}}")
}
