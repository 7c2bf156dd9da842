//! PKI error types.

use thiserror::Error;

/// Result type for PKI operations.
pub type Result<T> = std::result::Result<T, Error>;

/// PKI error variants.
#[derive(Debug, Error)]
pub enum Error {
    /// The PEM envelope could not be decoded.
    #[error("PEM decoding failed: {0}")]
    Pem(String),

    /// Certificate parsing failed.
    #[error("certificate parsing failed: {0}")]
    Parse(String),

    /// An identity field was empty or malformed.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
}
