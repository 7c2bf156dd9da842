//! HTTP implementation of the secret-store client.

use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use certvault_pki::paths::{cert_issue_path, pki_role_path, policy_path, UNWRAP_PATH};
use certvault_pki::{AccessPolicy, CertificateMaterial, IssueRequest, PkiRole};

use crate::error::{Result, StoreError};
use crate::token::VaultToken;
use crate::types::{CertificateEnvelope, UnwrappedSecret};
use crate::SecretStore;

/// Header carrying the secret-store token.
pub const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

/// Timeout applied to every secret-store request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated client for the secret store.
///
/// The token is fixed at construction and never changes afterwards.
#[derive(Debug, Clone)]
pub struct VaultClient {
    http: reqwest::Client,
    base: Url,
    token: VaultToken,
}

impl VaultClient {
    /// Creates a client for the store at `addr` using `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid base URL or the HTTP
    /// client cannot be built.
    pub fn new(addr: &str, token: VaultToken) -> Result<Self> {
        Self::with_http_client(default_http_client()?, addr, token)
    }

    /// Creates a client reusing an existing HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid base URL.
    pub fn with_http_client(http: reqwest::Client, addr: &str, token: VaultToken) -> Result<Self> {
        Ok(Self {
            http,
            base: base_url(addr)?,
            token,
        })
    }

    /// Returns the base address of the store.
    #[must_use]
    pub const fn address(&self) -> &Url {
        &self.base
    }

    async fn send(&self, method: Method, path: &str) -> Result<Response> {
        let url = endpoint(&self.base, path)?;
        debug!(%method, path, "secret store request");
        let response = self
            .http
            .request(method, url)
            .header(VAULT_TOKEN_HEADER, self.token.expose())
            .send()
            .await
            .map_err(|e| connectivity(path, &e))?;
        check_status(response, path).await
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Response> {
        let url = endpoint(&self.base, path)?;
        debug!(%method, path, "secret store request");
        let response = self
            .http
            .request(method, url)
            .header(VAULT_TOKEN_HEADER, self.token.expose())
            .json(body)
            .send()
            .await
            .map_err(|e| connectivity(path, &e))?;
        check_status(response, path).await
    }
}

impl SecretStore for VaultClient {
    async fn create_role(&self, name: &str, role: &PkiRole) -> Result<()> {
        let path = pki_role_path(name);
        self.send_json(Method::POST, &path, &role.to_request_body())
            .await?;
        info!(path = %path, "PKI role created");
        Ok(())
    }

    async fn create_policy(&self, policy: &AccessPolicy) -> Result<()> {
        let path = policy_path(&policy.name);
        self.send_json(Method::PUT, &path, &policy.to_request_body())
            .await?;
        info!(path = %path, "access policy created");
        Ok(())
    }

    async fn issue_certificate(
        &self,
        role: &str,
        request: &IssueRequest,
    ) -> Result<CertificateMaterial> {
        let path = cert_issue_path(role);
        let response = self.send_json(Method::POST, &path, request).await?;
        let envelope: CertificateEnvelope = decode(response, &path).await?;
        info!(
            path = %path,
            common_name = %request.common_name,
            serial = %envelope.data.serial_number,
            "certificate issued"
        );
        Ok(envelope.data)
    }

    async fn write_certificate(&self, path: &str, material: &CertificateMaterial) -> Result<()> {
        self.send_json(Method::PUT, path, material).await?;
        info!(path, "certificates written");
        Ok(())
    }

    async fn read_certificate(&self, path: &str) -> Result<CertificateMaterial> {
        let response = self.send(Method::GET, path).await?;
        let envelope: CertificateEnvelope = decode(response, path).await?;
        debug!(path, "certificates read");
        Ok(envelope.data)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        info!(path, "deleting");
        self.send(Method::DELETE, path).await?;
        Ok(())
    }
}

/// Unauthenticated client that unwraps single-use wrapped credentials.
#[derive(Debug, Clone)]
pub struct WrappingClient {
    http: reqwest::Client,
    base: Url,
}

impl WrappingClient {
    /// Creates an unwrapping client for the store at `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid base URL or the HTTP
    /// client cannot be built.
    pub fn new(addr: &str) -> Result<Self> {
        Ok(Self {
            http: default_http_client()?,
            base: base_url(addr)?,
        })
    }

    /// Unwraps the secret held by `wrap_token` itself.
    ///
    /// The wrap token is sent as the request credential with no explicit
    /// target, so the store unwraps exactly the envelope it was given.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the token (already unwrapped,
    /// expired, unknown) or the response cannot be decoded.
    pub async fn unwrap_self(&self, wrap_token: &str) -> Result<UnwrappedSecret> {
        let url = endpoint(&self.base, UNWRAP_PATH)?;
        let response = self
            .http
            .post(url)
            .header(VAULT_TOKEN_HEADER, wrap_token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| connectivity(UNWRAP_PATH, &e))?;
        let response = check_status(response, UNWRAP_PATH).await?;
        decode(response, UNWRAP_PATH).await
    }
}

fn default_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| StoreError::Client(e.to_string()))
}

/// Parses `addr` and makes sure relative joins append to its path.
fn base_url(addr: &str) -> Result<Url> {
    let mut url =
        Url::parse(addr).map_err(|e| StoreError::InvalidAddress(format!("{addr}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(StoreError::InvalidAddress(format!(
            "{addr}: not a base URL"
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn endpoint(base: &Url, path: &str) -> Result<Url> {
    base.join(&format!("v1/{}", path.trim_start_matches('/')))
        .map_err(|e| StoreError::InvalidAddress(format!("{path}: {e}")))
}

fn connectivity(path: &str, err: &reqwest::Error) -> StoreError {
    StoreError::Connectivity {
        path: path.to_string(),
        message: err.to_string(),
    }
}

async fn check_status(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status {
        StatusCode::NOT_FOUND => Err(StoreError::NotFound(path.to_string())),
        StatusCode::FORBIDDEN => Err(StoreError::Forbidden(path.to_string())),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::UnexpectedStatus {
                status: status.as_u16(),
                path: path.to_string(),
                body,
            })
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> Result<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| connectivity(path, &e))?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode {
        path: path.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::extract::State;
    use axum::http::{HeaderMap, Method as AxumMethod, Uri};
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::Router;
    use certvault_pki::paths::cert_path;
    use certvault_pki::{Identity, PrivateKeyPem};
    use parking_lot::Mutex;
    use test_case::test_case;

    #[derive(Debug, Clone)]
    struct Recorded {
        method: String,
        path: String,
        token: Option<String>,
        body: String,
    }

    type Log = Arc<Mutex<Vec<Recorded>>>;

    const MATERIAL_JSON: &str = r#"{"data": {
        "certificate": "CERT",
        "issuing_ca": "CA",
        "private_key": "KEY",
        "serial_number": "1a:2b",
        "private_key_type": "rsa"
    }}"#;

    async fn fake_vault(
        State(log): State<Log>,
        method: AxumMethod,
        uri: Uri,
        headers: HeaderMap,
        body: String,
    ) -> AxumResponse {
        let token = headers
            .get(VAULT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        log.lock().push(Recorded {
            method: method.to_string(),
            path: uri.path().to_string(),
            token: token.clone(),
            body,
        });

        let json = |status: u16, body: &str| {
            AxumResponse::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap_or_default()
        };

        match (method.as_str(), uri.path()) {
            ("POST", "/v1/pki/issue/web") | ("GET", "/v1/secret/certs/ns1/web") => {
                json(200, MATERIAL_JSON)
            }
            ("GET", "/v1/secret/certs/ns1/garbled") => json(200, "{not json"),
            ("GET", "/v1/secret/certs/ns1/locked") => json(403, r#"{"errors":["permission denied"]}"#),
            ("GET", _) => json(404, r#"{"errors":[]}"#),
            ("POST", "/v1/pki/issue/broken") => json(500, r#"{"errors":["internal error"]}"#),
            ("POST", "/v1/sys/wrapping/unwrap") if token.as_deref() == Some("wrap-ok") => json(
                200,
                r#"{"request_id":"r1","auth":{"client_token":"s.unwrapped","policies":["web"]}}"#,
            ),
            ("POST", "/v1/sys/wrapping/unwrap") => json(
                400,
                r#"{"errors":["wrapping token is not valid or does not exist"]}"#,
            ),
            _ => axum::http::StatusCode::NO_CONTENT.into_response(),
        }
    }

    async fn spawn_fake_vault() -> (String, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new().fallback(fake_vault).with_state(log.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}"), log)
    }

    fn client(addr: &str) -> VaultClient {
        VaultClient::new(addr, VaultToken::new("s.process")).unwrap()
    }

    fn material() -> CertificateMaterial {
        CertificateMaterial {
            certificate: "CERT".into(),
            issuing_ca: "CA".into(),
            private_key: PrivateKeyPem::new("KEY".into()),
            serial_number: "1a:2b".into(),
            private_key_type: "rsa".into(),
        }
    }

    #[test_case("http://vault:8200", "http://vault:8200/v1/pki/roles/web" ; "bare host")]
    #[test_case("http://vault:8200/", "http://vault:8200/v1/pki/roles/web" ; "trailing slash")]
    #[test_case("https://proxy/vault", "https://proxy/vault/v1/pki/roles/web" ; "path prefix")]
    fn endpoint_joins_under_v1(addr: &str, expected: &str) {
        let base = base_url(addr).unwrap();
        assert_eq!(endpoint(&base, "pki/roles/web").unwrap().as_str(), expected);
    }

    #[test]
    fn invalid_address_is_rejected() {
        assert!(matches!(
            VaultClient::new("not a url", VaultToken::new("t")),
            Err(StoreError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn create_role_posts_string_parameters() {
        let (addr, log) = spawn_fake_vault().await;
        client(&addr)
            .create_role("web", &PkiRole::for_cluster_domain("cluster.local"))
            .await
            .unwrap();

        let calls = log.lock().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, "POST");
        assert_eq!(calls[0].path, "/v1/pki/roles/web");
        assert_eq!(calls[0].token.as_deref(), Some("s.process"));
        let body: serde_json::Value = serde_json::from_str(&calls[0].body).unwrap();
        assert_eq!(body["allowed_domains"], "cluster.local");
        assert_eq!(body["max_ttl"], "72h");
    }

    #[tokio::test]
    async fn create_policy_puts_rules() {
        let (addr, log) = spawn_fake_vault().await;
        let policy = AccessPolicy::for_identity(&Identity::new("web", "ns1"));
        client(&addr).create_policy(&policy).await.unwrap();

        let calls = log.lock().clone();
        assert_eq!(calls[0].method, "PUT");
        assert_eq!(calls[0].path, "/v1/sys/policy/web");
        let body: serde_json::Value = serde_json::from_str(&calls[0].body).unwrap();
        assert!(body["rules"].as_str().unwrap().contains("secret/certs/ns1/web"));
    }

    #[tokio::test]
    async fn issue_certificate_decodes_material() {
        let (addr, log) = spawn_fake_vault().await;
        let request = IssueRequest::for_identity(&Identity::new("web", "ns1"), "cluster.local", "1h");
        let material = client(&addr).issue_certificate("web", &request).await.unwrap();

        assert_eq!(material.certificate, "CERT");
        assert_eq!(material.private_key.expose(), "KEY");

        let calls = log.lock().clone();
        let body: serde_json::Value = serde_json::from_str(&calls[0].body).unwrap();
        assert_eq!(body["common_name"], "web.ns1.svc.cluster.local");
        assert_eq!(body["ip_sans"], "127.0.0.1");
        assert_eq!(body["alt_names"], "web");
    }

    #[tokio::test]
    async fn issue_failure_carries_body() {
        let (addr, _) = spawn_fake_vault().await;
        let request = IssueRequest::for_identity(&Identity::new("broken", "ns1"), "cluster.local", "1h");
        let err = client(&addr)
            .issue_certificate("broken", &request)
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            StoreError::UnexpectedStatus { status: 500, body, .. } if body.contains("internal error")
        ));
    }

    #[tokio::test]
    async fn write_then_read_certificate() {
        let (addr, log) = spawn_fake_vault().await;
        let client = client(&addr);
        let path = cert_path("ns1", "web");

        client.write_certificate(&path, &material()).await.unwrap();
        let read = client.read_certificate(&path).await.unwrap();
        assert_eq!(read, material());

        let calls = log.lock().clone();
        assert_eq!(calls[0].method, "PUT");
        assert_eq!(calls[0].path, "/v1/secret/certs/ns1/web");
        let body: serde_json::Value = serde_json::from_str(&calls[0].body).unwrap();
        assert_eq!(body["private_key"], "KEY");
        assert_eq!(body["issuing_ca"], "CA");
    }

    #[tokio::test]
    async fn read_maps_not_found_and_forbidden() {
        let (addr, _) = spawn_fake_vault().await;
        let client = client(&addr);

        let err = client.read_certificate("secret/certs/ns1/missing").await.unwrap_err();
        assert!(err.is_not_found());

        let err = client.read_certificate("secret/certs/ns1/locked").await.unwrap_err();
        assert!(err.is_forbidden());
    }

    #[tokio::test]
    async fn read_reports_decode_errors() {
        let (addr, _) = spawn_fake_vault().await;
        let err = client(&addr)
            .read_certificate("secret/certs/ns1/garbled")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }

    #[tokio::test]
    async fn delete_sends_delete() {
        let (addr, log) = spawn_fake_vault().await;
        client(&addr).delete("pki/roles/web").await.unwrap();

        let calls = log.lock().clone();
        assert_eq!(calls[0].method, "DELETE");
        assert_eq!(calls[0].path, "/v1/pki/roles/web");
    }

    #[tokio::test]
    async fn unreachable_store_is_connectivity_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"))
            .delete("pki/roles/web")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Connectivity { .. }));
    }

    #[tokio::test]
    async fn unwrap_uses_wrap_token_as_credential() {
        let (addr, log) = spawn_fake_vault().await;
        let wrapping = WrappingClient::new(&addr).unwrap();

        let secret = wrapping.unwrap_self("wrap-ok").await.unwrap();
        assert_eq!(secret.client_token().unwrap().expose(), "s.unwrapped");

        let calls = log.lock().clone();
        assert_eq!(calls[0].path, "/v1/sys/wrapping/unwrap");
        assert_eq!(calls[0].token.as_deref(), Some("wrap-ok"));
        assert_eq!(calls[0].body, "{}");
    }

    #[tokio::test]
    async fn unwrap_rejects_spent_token() {
        let (addr, _) = spawn_fake_vault().await;
        let err = WrappingClient::new(&addr)
            .unwrap()
            .unwrap_self("wrap-spent")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnexpectedStatus { status: 400, .. }));
    }
}
