//! Single-slot, at-most-once token hand-off.
//!
//! The broker's HTTP handler and the process waiting for its token meet
//! here. Delivery is split into [`HandoffSlot::reserve`] and
//! [`Reservation::complete`] so the slot is claimed before the unwrap call:
//! a concurrent second delivery is rejected immediately, and a failed unwrap
//! (the reservation is dropped without completing) re-opens the slot.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use certvault_store::VaultToken;

use crate::error::{BrokerError, BrokerResult};

enum SlotState {
    Open(oneshot::Sender<VaultToken>),
    Reserved,
    Delivered,
}

/// Sending half of the hand-off, shared by broker handlers.
#[derive(Clone)]
pub struct HandoffSlot {
    state: Arc<Mutex<SlotState>>,
}

/// Receiving half of the hand-off, owned by the single waiter.
#[derive(Debug)]
pub struct TokenReceiver {
    rx: oneshot::Receiver<VaultToken>,
}

/// Creates a connected slot and receiver.
#[must_use]
pub fn handoff() -> (HandoffSlot, TokenReceiver) {
    let (tx, rx) = oneshot::channel();
    (
        HandoffSlot {
            state: Arc::new(Mutex::new(SlotState::Open(tx))),
        },
        TokenReceiver { rx },
    )
}

impl HandoffSlot {
    /// Claims the slot for one delivery.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::AlreadyDelivered`] if the token was already
    /// handed off or another delivery holds the reservation.
    pub fn reserve(&self) -> BrokerResult<Reservation> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SlotState::Reserved) {
            SlotState::Open(sender) => {
                debug!("hand-off slot reserved");
                Ok(Reservation {
                    state: Arc::clone(&self.state),
                    sender: Some(sender),
                })
            }
            previous => {
                *state = previous;
                Err(BrokerError::AlreadyDelivered)
            }
        }
    }

    /// Returns true once a token has been handed off.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Delivered)
    }
}

impl std::fmt::Debug for HandoffSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match *self.state.lock() {
            SlotState::Open(_) => "open",
            SlotState::Reserved => "reserved",
            SlotState::Delivered => "delivered",
        };
        f.debug_struct("HandoffSlot").field("state", &state).finish()
    }
}

/// Exclusive right to deliver the token.
///
/// Dropping a reservation without calling [`complete`](Self::complete)
/// re-opens the slot.
pub struct Reservation {
    state: Arc<Mutex<SlotState>>,
    sender: Option<oneshot::Sender<VaultToken>>,
}

impl Reservation {
    /// Hands the token to the waiter and closes the slot for good.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::WaiterGone`] if the receiver was dropped.
    pub fn complete(mut self, token: VaultToken) -> BrokerResult<()> {
        *self.state.lock() = SlotState::Delivered;
        match self.sender.take() {
            Some(sender) => sender.send(token).map_err(|_| BrokerError::WaiterGone),
            None => Err(BrokerError::AlreadyDelivered),
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            debug!("hand-off reservation released");
            *self.state.lock() = SlotState::Open(sender);
        }
    }
}

impl TokenReceiver {
    /// Waits for the token with no deadline.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::WaiterGone`] if every slot handle was dropped
    /// without delivering.
    pub async fn wait(self) -> BrokerResult<VaultToken> {
        self.rx.await.map_err(|_| BrokerError::WaiterGone)
    }

    /// Waits up to `timeout` for the token; `Ok(None)` on timeout.
    ///
    /// The receiver stays usable after a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::WaiterGone`] if every slot handle was dropped
    /// without delivering.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> BrokerResult<Option<VaultToken>> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(token)) => Ok(Some(token)),
            Ok(Err(_)) => Err(BrokerError::WaiterGone),
            Err(_) => Ok(None),
        }
    }
}
