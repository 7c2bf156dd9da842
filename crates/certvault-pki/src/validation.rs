//! Expiry inspection.
//!
//! The lifecycle only ever asks how long a certificate has left; chain and
//! signature checks are the consuming workload's job.

use chrono::{DateTime, Utc};

use crate::types::Certificate;

/// Checks if a certificate is expired at `now`.
#[must_use]
pub fn is_expired(cert: &Certificate, now: DateTime<Utc>) -> bool {
    cert.not_after() < now
}

/// Whole seconds between `now` and the certificate's expiry.
///
/// Negative once the certificate has expired.
#[must_use]
pub fn seconds_remaining(cert: &Certificate, now: DateTime<Utc>) -> i64 {
    (cert.not_after() - now).num_seconds()
}

/// Calculates the remaining validity period.
///
/// # Returns
///
/// The duration until expiry, or None if already expired.
#[must_use]
pub fn remaining_validity(cert: &Certificate, now: DateTime<Utc>) -> Option<chrono::Duration> {
    if cert.not_after() > now {
        Some(cert.not_after() - now)
    } else {
        None
    }
}
