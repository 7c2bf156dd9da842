//! Token acquisition state machine.
//!
//! ```text
//! NoToken -> Requesting -> WaitingForCallback -> Delivered
//!                 ^              |
//!                 |              +-> TimedOut --+
//!                 +-----------------------------+
//! ```
//!
//! Every retry, whether caused by a failed request or a callback that never
//! arrived, spends one unit of the retry budget. An exhausted budget ends in
//! `Failed`.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{info, warn};

use certvault_store::VaultToken;

use crate::error::{BrokerError, BrokerResult};
use crate::handoff::{handoff, TokenReceiver};
use crate::marker::MarkerFile;
use crate::requester::TokenRequester;
use crate::server::{BrokerHandle, BrokerState, TokenUnwrapper};

/// How long to wait for the controller's callback after a request.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay before retrying a failed token request.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Number of retries that fit in `minutes` at one retry every five seconds.
#[must_use]
pub const fn retry_budget(minutes: u32) -> u32 {
    minutes.saturating_mul(60) / 5
}

/// Progress of a token acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapState {
    /// Nothing requested yet.
    NoToken,
    /// Sending request number `attempt`.
    Requesting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Request accepted, waiting for the callback.
    WaitingForCallback {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// The token was handed off.
    Delivered,
    /// The callback did not arrive in time.
    TimedOut,
    /// Acquisition gave up.
    Failed(String),
}

/// Parameters for one acquisition.
#[derive(Debug, Clone)]
pub struct AcquireSettings {
    /// Identity name to request a token for.
    pub name: String,
    /// Identity namespace.
    pub namespace: String,
    /// Per-attempt callback timeout.
    pub callback_timeout: Duration,
    /// Delay after a failed request.
    pub retry_delay: Duration,
    /// Retries allowed after the first attempt.
    pub budget: u32,
}

impl AcquireSettings {
    /// Settings with the default timeouts and a one-minute retry budget.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            callback_timeout: CALLBACK_TIMEOUT,
            retry_delay: RETRY_DELAY,
            budget: retry_budget(1),
        }
    }

    /// Sizes the retry budget for `minutes`.
    #[must_use]
    pub const fn with_retry_timeout_minutes(mut self, minutes: u32) -> Self {
        self.budget = retry_budget(minutes);
        self
    }

    /// Sets the retry budget directly.
    #[must_use]
    pub const fn with_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    /// Sets the callback timeout.
    #[must_use]
    pub const fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Sets the delay after a failed request.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Drives requests until a token is handed off or the budget runs out.
#[derive(Debug)]
pub struct TokenAcquirer<R> {
    requester: R,
    settings: AcquireSettings,
    history: Vec<BootstrapState>,
}

impl<R: TokenRequester> TokenAcquirer<R> {
    /// Creates an acquirer in the `NoToken` state.
    pub fn new(requester: R, settings: AcquireSettings) -> Self {
        Self {
            requester,
            settings,
            history: vec![BootstrapState::NoToken],
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> &BootstrapState {
        self.history.last().unwrap_or(&BootstrapState::NoToken)
    }

    /// Returns every state visited so far.
    #[must_use]
    pub fn history(&self) -> &[BootstrapState] {
        &self.history
    }

    /// Requests a token and waits for it on `receiver`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::AcquisitionExhausted`] when the retry budget is
    /// spent, or [`BrokerError::WaiterGone`] if the broker went away.
    pub async fn acquire(&mut self, receiver: &mut TokenReceiver) -> BrokerResult<VaultToken> {
        let name = self.settings.name.clone();
        let namespace = self.settings.namespace.clone();
        let mut remaining = self.settings.budget;
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.transition(BootstrapState::Requesting { attempt });

            if let Err(e) = self.requester.request_token(&name, &namespace).await {
                warn!(
                    error = %e,
                    retry_in = ?self.settings.retry_delay,
                    "token request failed"
                );
                tokio::time::sleep(self.settings.retry_delay).await;
                self.spend(&mut remaining, attempt)?;
                continue;
            }

            info!(attempt, "token request complete, waiting for callback");
            self.transition(BootstrapState::WaitingForCallback { attempt });

            match receiver.wait_timeout(self.settings.callback_timeout).await {
                Ok(Some(token)) => {
                    self.transition(BootstrapState::Delivered);
                    return Ok(token);
                }
                Ok(None) => {
                    warn!(attempt, "timeout waiting for callback");
                    self.transition(BootstrapState::TimedOut);
                    self.spend(&mut remaining, attempt)?;
                }
                Err(e) => {
                    self.transition(BootstrapState::Failed(e.to_string()));
                    return Err(e);
                }
            }
        }
    }

    fn spend(&mut self, remaining: &mut u32, attempts: u32) -> BrokerResult<()> {
        if *remaining == 0 {
            let err = BrokerError::AcquisitionExhausted { attempts };
            self.transition(BootstrapState::Failed(err.to_string()));
            return Err(err);
        }
        *remaining -= 1;
        Ok(())
    }

    fn transition(&mut self, state: BootstrapState) {
        self.history.push(state);
    }
}

/// Runs the broker on `listen_addr` and acquires a token through it.
///
/// The listener is bound before the first request goes out and is shut down
/// once acquisition finishes, successfully or not.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or acquisition fails.
pub async fn obtain_token<U, R>(
    listen_addr: SocketAddr,
    unwrapper: U,
    marker: Option<MarkerFile>,
    requester: R,
    settings: AcquireSettings,
) -> BrokerResult<VaultToken>
where
    U: TokenUnwrapper,
    R: TokenRequester,
{
    let (slot, mut receiver) = handoff();
    let mut state = BrokerState::new(unwrapper, slot);
    if let Some(marker) = marker {
        state = state.with_marker(marker);
    }

    let broker = BrokerHandle::start(listen_addr, state).await?;
    let mut acquirer = TokenAcquirer::new(requester, settings);
    let result = acquirer.acquire(&mut receiver).await;

    if let Err(e) = broker.shutdown().await {
        warn!(error = %e, "broker did not shut down cleanly");
    }
    result
}
