//! Certificate lifecycle controller for certvault.
#![forbid(unsafe_code)]
//!
//! Maps the `gencert` label on Kubernetes Services to secret-store
//! operations:
//!
//! - [`watcher`]: turns Service watch events into creation and deletion
//!   events on one single-slot channel;
//! - [`issuer`]: on creation with `gencert=true`, creates the PKI role and
//!   policy, issues and stores a certificate, then relabels `gencert=false`;
//! - [`revoker`]: on deletion of a labelled Service, deletes its material,
//!   role and policy;
//! - [`rotation`]: periodically re-labels Services whose certificate is
//!   about to expire and restarts the Deployments serving them;
//! - [`controller`]: the loop consuming watcher events.
//!
//! Components receive a [`ControllerContext`] holding the secret store,
//! the cluster API and the settings.
//!
//! With the `testing` feature, [`fake::FakeCluster`] provides an in-memory
//! cluster.

pub mod cluster;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod issuer;
pub mod k8s;
pub mod labels;
pub mod revoker;
pub mod rotation;
pub mod service;
pub mod watcher;

pub use cluster::ClusterApi;
pub use config::ControllerConfig;
pub use context::{ControllerContext, ControllerSettings};
pub use controller::run_event_loop;
pub use error::{ControllerError, Result};
pub use issuer::{issue_certificate, IssueError, IssueOutcome, SkipReason};
pub use k8s::KubeCluster;
pub use labels::LifecycleLabel;
pub use revoker::{revoke_certificate, RevocationReport};
pub use rotation::{run_rotation_loop, run_sweep, Rotated, SweepReport};
pub use service::{ServiceEvent, ServiceMeta};
pub use watcher::{event_channels, run_watcher, EventClassifier, EventSink, EventSource};
