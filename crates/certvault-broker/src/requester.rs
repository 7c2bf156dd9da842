//! Token request to the controller.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, info};

use crate::error::{BrokerError, BrokerResult};

/// Timeout for a single token request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Asks the controller to deliver a wrapped token for an identity.
pub trait TokenRequester: Send + Sync {
    /// Requests a token for `name` in `namespace`.
    ///
    /// Success only means the controller accepted the request; the token
    /// itself arrives later on the broker endpoint.
    fn request_token(
        &self,
        name: &str,
        namespace: &str,
    ) -> impl Future<Output = BrokerResult<()>> + Send;
}

/// HTTP client for the controller's `/token` endpoint.
#[derive(Debug, Clone)]
pub struct ControllerClient {
    http: reqwest::Client,
    base: String,
}

impl ControllerClient {
    /// Creates a client for the controller at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Config`] if the HTTP client cannot be built.
    pub fn new(addr: impl Into<String>) -> BrokerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BrokerError::Config(e.to_string()))?;
        Ok(Self {
            http,
            base: addr.into().trim_end_matches('/').to_string(),
        })
    }

    /// Returns the controller base address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.base
    }
}

impl TokenRequester for ControllerClient {
    async fn request_token(&self, name: &str, namespace: &str) -> BrokerResult<()> {
        let url = format!("{}/token", self.base);
        debug!(%url, name, namespace, "requesting token");

        let response = self
            .http
            .post(&url)
            .query(&[("name", name), ("namespace", namespace)])
            .send()
            .await
            .map_err(|e| BrokerError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            info!(name, namespace, "token request accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(BrokerError::RequestRejected {
            status: status.as_u16(),
            body,
        })
    }
}
