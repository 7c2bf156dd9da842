//! Wrapped-token hand-off for certvault.
#![forbid(unsafe_code)]
//!
//! A workload never carries a long-lived secret-store token. Instead it:
//!
//! 1. binds a small HTTP endpoint (the broker, see [`server`]),
//! 2. asks a separate controller to mint and wrap a token for its identity
//!    (the requester, see [`requester`]),
//! 3. receives the wrapped token on the endpoint, unwraps it once against the
//!    secret store, and hands the result to exactly one local waiter through
//!    a [`handoff`] slot.
//!
//! The `vault-init` binary adds the bootstrap variant: the unwrapped secret
//! is persisted to a marker file ([`marker`]) so a restarted container does
//! not request a second token, and the issued certificate is written to disk
//! for the workload ([`artifacts`]).

pub mod artifacts;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod handoff;
pub mod marker;
pub mod requester;
pub mod server;

pub use bootstrap::{obtain_token, AcquireSettings, BootstrapState, TokenAcquirer};
pub use error::{BrokerError, BrokerResult};
pub use handoff::{handoff, HandoffSlot, TokenReceiver};
pub use marker::MarkerFile;
pub use requester::{ControllerClient, TokenRequester};
pub use server::{BrokerHandle, BrokerState, TokenUnwrapper};
