//! PKI primitives for certvault.
#![forbid(unsafe_code)]
//!
//! This crate holds the pieces of the certificate lifecycle that do not talk
//! to the network: how an identity is named, where its material lives in the
//! secret store, which role and policy it gets, and how much validity its
//! current certificate has left.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use certvault_pki::{service_domain_name, Identity, RotationPolicy};
//!
//! let identity = Identity::new("api", "payments");
//! assert_eq!(
//!     identity.common_name("cluster.local"),
//!     service_domain_name("api", "payments", "cluster.local"),
//! );
//!
//! let policy = RotationPolicy::from_minutes(1);
//! assert_eq!(policy.threshold(), Duration::from_secs(60));
//! ```
//!
//! # Modules
//!
//! - [`identity`] - Workload identity and DNS naming
//! - [`paths`] - Secret-store paths derived from an identity
//! - [`role`] - PKI role parameters and access policies
//! - [`types`] - Certificate material and parsed certificates
//! - [`validation`] - Expiry inspection
//! - [`rotation`] - Rotation threshold policy
//! - [`error`] - Error types

pub mod error;
pub mod identity;
pub mod paths;
pub mod role;
pub mod rotation;
pub mod types;
pub mod validation;

pub use error::{Error, Result};
pub use identity::{service_domain_name, Identity};
pub use role::{AccessPolicy, PkiRole};
pub use rotation::{check_rotation_needed, RotationDecision, RotationPolicy};
pub use types::{Certificate, CertificateMaterial, IssueRequest, PrivateKeyPem};
pub use validation::{is_expired, remaining_validity, seconds_remaining};
