//! Certificate rotation policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Certificate;
use crate::validation::seconds_remaining;

/// Default rotation threshold in seconds.
pub const DEFAULT_THRESHOLD_SECS: u64 = 60;

/// Remaining-validity cutoff below which a certificate is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPolicy {
    threshold: Duration,
}

impl RotationPolicy {
    /// Creates a policy with the given threshold.
    #[must_use]
    pub const fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    /// Creates a policy from a threshold expressed in minutes.
    #[must_use]
    pub const fn from_minutes(minutes: u64) -> Self {
        Self::new(Duration::from_secs(minutes.saturating_mul(60)))
    }

    /// Returns the threshold.
    #[must_use]
    pub const fn threshold(&self) -> Duration {
        self.threshold
    }

    fn threshold_secs(&self) -> i64 {
        i64::try_from(self.threshold.as_secs()).unwrap_or(i64::MAX)
    }

    /// Decides whether `cert` must be rotated at `now`.
    #[must_use]
    pub fn evaluate(&self, cert: &Certificate, now: DateTime<Utc>) -> RotationDecision {
        let seconds_remaining = seconds_remaining(cert, now);
        if seconds_remaining <= self.threshold_secs() {
            RotationDecision::Rotate { seconds_remaining }
        } else {
            RotationDecision::Healthy { seconds_remaining }
        }
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_THRESHOLD_SECS))
    }
}

/// Outcome of evaluating a certificate against a [`RotationPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationDecision {
    /// Remaining validity is at or below the threshold.
    Rotate {
        /// Whole seconds left before expiry.
        seconds_remaining: i64,
    },
    /// Remaining validity is above the threshold.
    Healthy {
        /// Whole seconds left before expiry.
        seconds_remaining: i64,
    },
}

impl RotationDecision {
    /// Returns true if the certificate should be replaced.
    #[must_use]
    pub const fn needs_rotation(&self) -> bool {
        matches!(self, Self::Rotate { .. })
    }

    /// Returns the remaining validity in seconds.
    #[must_use]
    pub const fn seconds_remaining(&self) -> i64 {
        match self {
            Self::Rotate { seconds_remaining } | Self::Healthy { seconds_remaining } => {
                *seconds_remaining
            }
        }
    }
}

/// Checks if a certificate needs rotation based on the policy.
#[must_use]
pub fn check_rotation_needed(cert: &Certificate, policy: &RotationPolicy, now: DateTime<Utc>) -> bool {
    policy.evaluate(cert, now).needs_rotation()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use proptest::prelude::*;

    fn cert_expiring_in(now: DateTime<Utc>, secs: i64) -> Certificate {
        Certificate::new(
            now - ChronoDuration::days(1),
            now + ChronoDuration::seconds(secs),
            Some("web.ns1.svc.cluster.local".into()),
            "01".into(),
            vec![],
        )
    }

    #[test]
    fn default_threshold_is_one_minute() {
        assert_eq!(RotationPolicy::default().threshold(), Duration::from_secs(60));
        assert_eq!(RotationPolicy::from_minutes(1), RotationPolicy::default());
    }

    #[test]
    fn just_inside_threshold_rotates() {
        let now = Utc::now();
        let policy = RotationPolicy::from_minutes(1);
        let cert = cert_expiring_in(now, 59);
        assert!(check_rotation_needed(&cert, &policy, now));
    }

    #[test]
    fn just_outside_threshold_is_healthy() {
        let now = Utc::now();
        let policy = RotationPolicy::from_minutes(1);
        let cert = cert_expiring_in(now, 61);
        assert!(!check_rotation_needed(&cert, &policy, now));
    }

    #[test]
    fn exactly_at_threshold_rotates() {
        let now = Utc::now();
        let cert = cert_expiring_in(now, 60);
        assert_eq!(
            RotationPolicy::default().evaluate(&cert, now),
            RotationDecision::Rotate { seconds_remaining: 60 }
        );
    }

    #[test]
    fn expired_certificate_rotates() {
        let now = Utc::now();
        let decision = RotationPolicy::default().evaluate(&cert_expiring_in(now, -30), now);
        assert!(decision.needs_rotation());
        assert_eq!(decision.seconds_remaining(), -30);
    }

    #[test]
    fn policy_serialization() {
        let policy = RotationPolicy::from_minutes(5);
        let json = serde_json::to_string(&policy).unwrap();
        let back: RotationPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back.threshold(), Duration::from_secs(300));
    }

    proptest! {
        #[test]
        fn boundary_is_one_second_either_side(threshold in 1u64..100_000) {
            let now = Utc::now();
            let policy = RotationPolicy::new(Duration::from_secs(threshold));
            let threshold = i64::try_from(threshold).unwrap();

            prop_assert!(check_rotation_needed(&cert_expiring_in(now, threshold - 1), &policy, now));
            prop_assert!(!check_rotation_needed(&cert_expiring_in(now, threshold + 1), &policy, now));
        }
    }
}
