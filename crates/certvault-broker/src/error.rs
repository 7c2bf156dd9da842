//! Error types for the token broker and bootstrap.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use certvault_store::StoreError;

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur while brokering a token.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A token was already delivered (or is being delivered).
    #[error("token already delivered")]
    AlreadyDelivered,

    /// The callback body was not a wrap-info document.
    #[error("invalid wrap info: {0}")]
    InvalidRequest(String),

    /// Unwrapping against the secret store failed.
    #[error("unwrap failed: {0}")]
    Unwrap(#[source] StoreError),

    /// The unwrapped secret carried no client token.
    #[error("unwrapped secret carries no client token")]
    MissingClientToken,

    /// The local waiter went away before the token arrived.
    #[error("token waiter is gone")]
    WaiterGone,

    /// The controller refused the token request.
    #[error("token request rejected with status {status}: {body}")]
    RequestRejected {
        /// HTTP status returned by the controller.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The token request never got a response.
    #[error("token request failed: {0}")]
    RequestFailed(String),

    /// The retry budget ran out.
    #[error("token request timeout after {attempts} attempts")]
    AcquisitionExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Certificates did not appear in time.
    #[error("certificate request timeout for {0}")]
    CertificateTimeout(String),

    /// Marker file could not be read or written.
    #[error("token file {path}: {message}")]
    Marker {
        /// Marker file path.
        path: String,
        /// What went wrong.
        message: String,
    },

    /// Failed to bind the broker listener.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(std::net::SocketAddr, std::io::Error),

    /// The broker server stopped with an error.
    #[error("broker server error: {0}")]
    Server(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Self::AlreadyDelivered => (StatusCode::CONFLICT, "already_delivered"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"error":"internal_error","message":"failed to serialize error"}"#.to_string()
        });

        (status, [("content-type", "application/json")], json).into_response()
    }
}
