//! Error types for the certificate lifecycle controller.

use thiserror::Error;

use certvault_broker::BrokerError;
use certvault_store::StoreError;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Errors that can occur in the controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Secret-store call failed.
    #[error("secret store error: {0}")]
    Store(#[from] StoreError),

    /// Kubernetes API call failed.
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Cluster operation failed for a reason other than the API client.
    #[error("cluster error: {0}")]
    Cluster(String),

    /// Certificate material could not be parsed.
    #[error("certificate error: {0}")]
    Pki(#[from] certvault_pki::Error),

    /// The resource watch could not be established.
    #[error("watch error: {0}")]
    Watch(String),

    /// Token bootstrap failed.
    #[error("token bootstrap error: {0}")]
    Broker(#[from] BrokerError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ControllerError {
    /// Returns true if the error is a secret-store 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ControllerError::Cluster("service web not found".into());
        assert_eq!(err.to_string(), "cluster error: service web not found");

        let err: ControllerError = StoreError::NotFound("secret/certs/ns1/web".into()).into();
        assert!(err.is_not_found());
        assert!(!ControllerError::Watch("boom".into()).is_not_found());
    }
}
