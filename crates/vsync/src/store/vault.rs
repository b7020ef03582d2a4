//! HashiCorp Vault KV v2 client over the HTTP API
//!
//! Listing goes through `GET /v1/<mount>/metadata/<path>?list=true`, reads
//! through `GET /v1/<mount>/data/<path>` and writes through
//! `POST /v1/<mount>/data/<path>` with the payload wrapped in `{"data": ...}`.
//! Path segments are percent-encoded one by one, so key names holding `#`,
//! `?` or `%` reach the server intact.

use super::{SecretPayload, SecretStore, StoreError};
use crate::path::{ChildEntry, DataAddress, ListingAddress};
use crate::retry::RetryConfig;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for one Vault instance
#[derive(Clone)]
pub struct VaultConfig {
    /// Base URL (e.g., https://vault.example.com:8200)
    pub addr: String,
    /// Client token sent as X-Vault-Token
    pub token: String,
    /// Enterprise namespace sent as X-Vault-Namespace
    pub namespace: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Retry policy for transient failures
    pub retry: RetryConfig,
    /// Extra PEM CA certificate to trust
    pub ca_cert: Option<PathBuf>,
    /// Accept any TLS certificate (lab setups only)
    pub tls_skip_verify: bool,
}

impl VaultConfig {
    pub fn new(addr: &str, token: &str) -> Self {
        Self {
            addr: addr.trim().trim_end_matches('/').to_string(),
            token: token.to_string(),
            namespace: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryConfig::default(),
            ca_cert: None,
            tls_skip_verify: false,
        }
    }

    fn build_http_client(&self) -> Result<Client, StoreError> {
        let mut builder = Client::builder().timeout(self.request_timeout);

        if let Some(path) = &self.ca_cert {
            let pem = std::fs::read(path).map_err(|e| {
                StoreError::Config(format!("failed to read CA certificate {}: {}", path.display(), e))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                StoreError::Config(format!("failed to parse CA certificate {}: {}", path.display(), e))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        if self.tls_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|e| StoreError::Config(format!("failed to build HTTP client: {}", e)))
    }
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("addr", &self.addr)
            .field("token", &"<redacted>")
            .field("namespace", &self.namespace)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .field("ca_cert", &self.ca_cert)
            .field("tls_skip_verify", &self.tls_skip_verify)
            .finish()
    }
}

/// An authenticated connection to a Vault server
#[derive(Debug)]
pub struct VaultClient {
    config: VaultConfig,
    base: Url,
    http: Client,
}

impl VaultClient {
    /// Build a client without contacting the server
    pub fn new(config: VaultConfig) -> Result<Self, StoreError> {
        if config.addr.is_empty() {
            return Err(StoreError::Config("Vault address is empty".to_string()));
        }
        if config.token.is_empty() {
            return Err(StoreError::Config("Vault token is empty".to_string()));
        }
        let base = Url::parse(&config.addr)
            .map_err(|e| StoreError::Config(format!("invalid Vault address {}: {}", config.addr, e)))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Config(format!(
                "invalid Vault address {}: not an http(s) URL",
                config.addr
            )));
        }
        let http = config.build_http_client()?;
        Ok(Self { config, base, http })
    }

    /// Build a client and check that its token is accepted
    pub async fn connect(config: VaultConfig) -> Result<Self, StoreError> {
        let client = Self::new(config)?;
        client.verify_token().await?;
        info!(addr = %client.config.addr, "Vault client connected");
        Ok(client)
    }

    pub fn addr(&self) -> &str {
        &self.config.addr
    }

    /// Look up the client's own token
    pub async fn verify_token(&self) -> Result<(), StoreError> {
        let (status, body) = self
            .send(
                "lookup-self",
                Method::GET,
                self.endpoint(["auth", "token", "lookup-self"])?,
                None,
            )
            .await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status, &body))
        }
    }

    /// `<addr>/v1/<segments...>`, each segment percent-encoded
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Config(format!("invalid Vault address {}", self.config.addr)))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        what: &str,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<(StatusCode, String), StoreError> {
        self.config
            .retry
            .run(what, || self.send_once(method.clone(), url.clone(), body))
            .await
    }

    async fn send_once(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<(StatusCode, String), StoreError> {
        let mut request = self
            .http
            .request(method, url)
            .header(TOKEN_HEADER, &self.config.token);
        if let Some(namespace) = &self.config.namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(format!("failed to read response body: {}", e)))?;

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(status_error(status, &text));
        }
        Ok((status, text))
    }
}

#[async_trait]
impl SecretStore for VaultClient {
    async fn list(&self, address: &ListingAddress) -> Result<Option<Vec<ChildEntry>>, StoreError> {
        debug!(addr = %self.config.addr, %address, "LIST");
        let mut url = self.endpoint(address.segments())?;
        url.query_pairs_mut().append_pair("list", "true");
        let (status, body) = self.send("list", Method::GET, url, None).await?;
        match status {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let parsed: ListResponse = serde_json::from_str(&body).map_err(|e| {
                    StoreError::Decode(format!("invalid list response from {}: {}", address, e))
                })?;
                let keys = parsed.data.map(|data| data.keys).unwrap_or_default();
                if keys.is_empty() {
                    return Ok(None);
                }
                Ok(Some(keys.iter().map(|key| ChildEntry::parse(key)).collect()))
            }
            status => Err(status_error(status, &body)),
        }
    }

    async fn read(&self, address: &DataAddress) -> Result<Option<SecretPayload>, StoreError> {
        debug!(addr = %self.config.addr, %address, "GET");
        let url = self.endpoint(address.segments())?;
        let (status, body) = self.send("read", Method::GET, url, None).await?;
        match status {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let parsed: ReadResponse = serde_json::from_str(&body).map_err(|e| {
                    StoreError::Decode(format!("invalid read response from {}: {}", address, e))
                })?;
                // A deleted or destroyed current version comes back with null data
                Ok(parsed.data.and_then(|data| data.data))
            }
            status => Err(status_error(status, &body)),
        }
    }

    async fn write(&self, address: &DataAddress, payload: &SecretPayload) -> Result<(), StoreError> {
        debug!(addr = %self.config.addr, %address, "POST");
        let url = self.endpoint(address.segments())?;
        let body = json!({ "data": payload });
        let (status, text) = self.send("write", Method::POST, url, Some(&body)).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status, &text))
        }
    }
}

#[derive(Deserialize)]
struct ListResponse {
    data: Option<ListData>,
}

#[derive(Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Deserialize)]
struct ReadResponse {
    data: Option<ReadData>,
}

#[derive(Deserialize)]
struct ReadData {
    data: Option<SecretPayload>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

/// Turn a non-success response into a [`StoreError`], preferring Vault's
/// `{"errors": [...]}` messages over the raw body
fn status_error(status: StatusCode, body: &str) -> StoreError {
    let message = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
        _ => body.trim().to_string(),
    };
    StoreError::Status {
        status: status.as_u16(),
        body: message,
    }
}
