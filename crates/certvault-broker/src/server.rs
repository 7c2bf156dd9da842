//! Broker HTTP endpoint.
//!
//! `POST /` receives `{"token": "<wrap token>"}` from the controller,
//! unwraps it once and hands the client token to the local waiter.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{post, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use certvault_store::{StoreError, UnwrappedSecret, WrappingClient};

use crate::error::{BrokerError, BrokerResult};
use crate::handoff::HandoffSlot;
use crate::marker::MarkerFile;

/// Unwraps a single-use wrapped credential.
pub trait TokenUnwrapper: Send + Sync + 'static {
    /// Unwraps the secret held by `wrap_token`.
    fn unwrap_token(
        &self,
        wrap_token: &str,
    ) -> impl Future<Output = Result<UnwrappedSecret, StoreError>> + Send;
}

impl TokenUnwrapper for WrappingClient {
    async fn unwrap_token(&self, wrap_token: &str) -> Result<UnwrappedSecret, StoreError> {
        self.unwrap_self(wrap_token).await
    }
}

/// Callback body sent by the controller.
#[derive(Debug, Deserialize)]
struct WrapInfo {
    token: String,
}

/// Shared state of the broker endpoint.
pub struct BrokerState<U> {
    unwrapper: Arc<U>,
    slot: HandoffSlot,
    marker: Option<MarkerFile>,
}

impl<U> Clone for BrokerState<U> {
    fn clone(&self) -> Self {
        Self {
            unwrapper: Arc::clone(&self.unwrapper),
            slot: self.slot.clone(),
            marker: self.marker.clone(),
        }
    }
}

impl<U: TokenUnwrapper> BrokerState<U> {
    /// Creates broker state delivering into `slot`.
    pub fn new(unwrapper: U, slot: HandoffSlot) -> Self {
        Self {
            unwrapper: Arc::new(unwrapper),
            slot,
            marker: None,
        }
    }

    /// Persists the unwrapped secret to `marker` (bootstrap variant).
    #[must_use]
    pub fn with_marker(mut self, marker: MarkerFile) -> Self {
        self.marker = Some(marker);
        self
    }
}

/// Creates the broker router.
pub fn router<U: TokenUnwrapper>(state: BrokerState<U>) -> Router {
    Router::new()
        .route("/", post(receive_wrapped_token::<U>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn receive_wrapped_token<U: TokenUnwrapper>(
    State(state): State<BrokerState<U>>,
    body: Bytes,
) -> BrokerResult<StatusCode> {
    if let Some(marker) = &state.marker {
        if marker.exists() {
            warn!(path = %marker.path().display(), "token file exists, rejecting delivery");
            return Err(BrokerError::AlreadyDelivered);
        }
    }

    let wrap_info: WrapInfo =
        serde_json::from_slice(&body).map_err(|e| BrokerError::InvalidRequest(e.to_string()))?;

    let reservation = state.slot.reserve().inspect_err(|_| {
        warn!("token already delivered, rejecting delivery");
    })?;

    let secret = state
        .unwrapper
        .unwrap_token(&wrap_info.token)
        .await
        .map_err(|e| {
            warn!(error = %e, "failed to unwrap token");
            BrokerError::Unwrap(e)
        })?;

    let token = secret
        .client_token()
        .cloned()
        .ok_or(BrokerError::MissingClientToken)?;

    if let Some(marker) = state.marker.clone() {
        let persisted = secret.clone();
        tokio::task::spawn_blocking(move || marker.persist(&persisted))
            .await
            .map_err(|e| BrokerError::Server(format!("marker write task failed: {e}")))??;
    }

    reservation.complete(token)?;
    info!("token delivered");
    Ok(StatusCode::OK)
}

/// A running broker endpoint.
#[derive(Debug)]
pub struct BrokerHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl BrokerHandle {
    /// Binds `addr` and starts serving.
    ///
    /// The socket is bound before this returns, so a token request sent
    /// afterwards can always be answered.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::BindFailed`] if the address cannot be bound.
    pub async fn start<U: TokenUnwrapper>(
        addr: SocketAddr,
        state: BrokerState<U>,
    ) -> BrokerResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BrokerError::BindFailed(addr, e))?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "broker listening");

        let (shutdown, signal) = oneshot::channel::<()>();
        let app = router(state);
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await
        });

        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    /// Returns the bound address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits for in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Server`] if the server task failed.
    pub async fn shutdown(self) -> BrokerResult<()> {
        let _ = self.shutdown.send(());
        match self.task.await {
            Ok(Ok(())) => {
                info!("broker shut down");
                Ok(())
            }
            Ok(Err(e)) => Err(BrokerError::Server(e.to_string())),
            Err(e) => Err(BrokerError::Server(e.to_string())),
        }
    }
}
