//! Secret-store error types.

use thiserror::Error;

/// Result type for secret-store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures talking to the secret store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never got a response.
    #[error("secret store unreachable for {path}: {message}")]
    Connectivity {
        /// Path being accessed.
        path: String,
        /// Transport error.
        message: String,
    },

    /// The token is not allowed to touch the path.
    #[error("access forbidden for {0}; add the right policy to the token")]
    Forbidden(String),

    /// Nothing exists at the path yet.
    #[error("secret not present at {0}")]
    NotFound(String),

    /// The response body could not be decoded.
    #[error("failed to decode response from {path}: {message}")]
    Decode {
        /// Path being accessed.
        path: String,
        /// Decoder error.
        message: String,
    },

    /// Any other non-success status.
    #[error("unexpected status {status} from {path}: {body}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Path being accessed.
        path: String,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// The configured address is not a usable base URL.
    #[error("invalid secret store address: {0}")]
    InvalidAddress(String),
}

impl StoreError {
    /// Returns true for 404-equivalent errors.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true for 403-equivalent errors.
    #[must_use]
    pub const fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_forbidden_helpers() {
        assert!(StoreError::NotFound("secret/certs/ns1/web".into()).is_not_found());
        assert!(StoreError::Forbidden("secret/certs/ns1/web".into()).is_forbidden());
        assert!(!StoreError::InvalidAddress("x".into()).is_not_found());
    }

    #[test]
    fn error_display() {
        let err = StoreError::UnexpectedStatus {
            status: 500,
            path: "pki/issue/web".into(),
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "unexpected status 500 from pki/issue/web: boom");

        let err = StoreError::Forbidden("secret/certs/ns1/web".into());
        assert!(err.to_string().contains("add the right policy"));
    }
}
