//! Label keys and the lifecycle label state.

use chrono::{DateTime, Utc};

/// Service label driving issuance.
pub const GENCERT_LABEL: &str = "gencert";

/// Pod-template label naming the Service a Deployment serves.
pub const SERVICE_LABEL: &str = "service";

/// Pod-template label stamped to force a rollout.
pub const LAST_CERT_UPDATE_LABEL: &str = "lastcertupdate";

/// Format of the rollout stamp (`dd-mm-YYYYTHH.MM.SS`).
pub const ROLLOUT_STAMP_FORMAT: &str = "%d-%m-%YT%H.%M.%S";

/// Label value requesting issuance.
pub const REQUESTED: &str = "true";

/// Label value written after a successful issuance.
pub const ISSUED: &str = "false";

/// State of the `gencert` label on a Service.
///
/// `Absent` and `Issued` are different: only a labelled Service has
/// certificate material to revoke or rotate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleLabel {
    /// No label, or an empty value.
    Absent,
    /// `"true"`: a certificate should be issued.
    Requested,
    /// `"false"`: a certificate has been issued.
    Issued,
    /// Any other value.
    Other(String),
}

impl LifecycleLabel {
    /// Interprets a raw label value.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("") => Self::Absent,
            Some(REQUESTED) => Self::Requested,
            Some(ISSUED) => Self::Issued,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    /// Returns true for any non-empty value.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Returns true if issuance was requested.
    #[must_use]
    pub const fn is_requested(&self) -> bool {
        matches!(self, Self::Requested)
    }
}

/// Formats the rollout stamp for `now`.
#[must_use]
pub fn rollout_stamp(now: DateTime<Utc>) -> String {
    now.format(ROLLOUT_STAMP_FORMAT).to_string()
}
