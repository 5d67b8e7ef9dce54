//! Verenigingsregister beheer API client
//!
//! Every write carries the ETag of the read it is based on as `If-Match`;
//! the registry answers 409/412 when the association changed in between.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use reqwest::{header, Method, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::{AuthError, TokenProvider};
use crate::location::{Vereniging, VerenigingEnvelope};
use crate::mapping::AttributeMap;
use crate::resolver::VCode;

const SEQUENCE_HEADER: &str = "vr-sequence";
const API_VERSION_HEADER: &str = "vr-api-version";
const INITIATOR_HEADER: &str = "vr-initiator";
const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to fetch {what}: {reason}")]
    RemoteFetch { what: String, reason: String },

    #[error("registry rejected write to {what} with HTTP {status}: {body}")]
    RemoteWrite {
        what: String,
        status: u16,
        body: String,
    },

    #[error("registry write to {what} failed: {reason}")]
    RemoteWriteTransport { what: String, reason: String },

    #[error("association changed since it was read (HTTP {status})")]
    ConcurrencyConflict { status: u16 },

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl RegistryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ConcurrencyConflict { .. } => StatusCode::PRECONDITION_FAILED,
            Self::Auth(e) => e.status_code(),
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Re-running the whole flow from the fetch may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::RemoteFetch { .. }
        )
    }

    fn fetch(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::RemoteFetch {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

/// A vereniging together with the ETag that guards writes against it
#[derive(Debug, Clone)]
pub struct VerenigingSnapshot {
    pub vereniging: Vereniging,
    pub etag: String,
    /// Raw response body
    pub body: Value,
}

/// Headers returned by a successful write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReceipt {
    /// ETag after the write, for chaining further writes
    pub etag: Option<String>,
    /// Event sequence number the write was recorded at
    pub sequence: Option<u64>,
}

/// Registry operations the reconciliation flow depends on
#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn get_vereniging(&self, vcode: &VCode) -> Result<VerenigingSnapshot, RegistryError>;

    async fn update_locatie(
        &self,
        vcode: &VCode,
        locatie_id: &str,
        adres: &AttributeMap,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError>;

    async fn update_maatschappelijke_zetel(
        &self,
        vcode: &VCode,
        locatie_id: &str,
        locatie: &Value,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError>;

    async fn delete_locatie(
        &self,
        vcode: &VCode,
        locatie_id: &str,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError>;
}

#[derive(Debug, Clone)]
pub struct RegistryClientConfig {
    pub base_url: String,
    pub api_version: Option<String>,
    pub initiator: Option<String>,
    pub timeout: Duration,
}

/// HTTP client for `/v1/verenigingen`
pub struct VerenigingenClient {
    base_url: String,
    api_version: Option<String>,
    initiator: Option<String>,
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl VerenigingenClient {
    pub fn new(
        config: RegistryClientConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RegistryError::fetch("http client", e))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.filter(|v| !v.is_empty()),
            initiator: config.initiator.filter(|v| !v.is_empty()),
            http,
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/verenigingen/{}", self.base_url, path)
    }

    async fn request(&self, method: Method, url: &str) -> Result<reqwest::RequestBuilder, RegistryError> {
        let token = self.tokens.access_token().await?;
        let correlation_id = uuid::Uuid::new_v4().to_string();
        debug!("{} {} ({})", method, url, correlation_id);

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header(CORRELATION_HEADER, correlation_id);
        if let Some(version) = &self.api_version {
            request = request.header(API_VERSION_HEADER, version);
        }
        if let Some(initiator) = &self.initiator {
            request = request.header(INITIATOR_HEADER, initiator);
        }
        Ok(request)
    }

    async fn read(&self, path: &str) -> Result<Response, RegistryError> {
        let url = self.url(path);
        let response = self
            .request(Method::GET, &url)
            .await?
            .send()
            .await
            .map_err(|e| RegistryError::fetch(path, e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!("GET {} returned {}: {}", url, status, body);
            return Err(RegistryError::fetch(path, format!("HTTP {}", status.as_u16())));
        }
        Ok(response)
    }

    async fn write(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        let url = self.url(path);
        let mut request = self
            .request(method.clone(), &url)
            .await?
            .header(header::IF_MATCH, etag);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::RemoteWriteTransport {
                what: path.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            let receipt = WriteReceipt {
                etag: header_str(&response, header::ETAG.as_str()),
                sequence: header_str(&response, SEQUENCE_HEADER).and_then(|s| s.parse().ok()),
            };
            debug!("{} {} -> {} {:?}", method, url, status, receipt);
            return Ok(receipt);
        }

        let body = response.text().await.unwrap_or_default();
        warn!("{} {} returned {}: {}", method, url, status, body);
        match status.as_u16() {
            409 | 412 => Err(RegistryError::ConcurrencyConflict {
                status: status.as_u16(),
            }),
            code => Err(RegistryError::RemoteWrite {
                what: path.to_string(),
                status: code,
                body,
            }),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get_vereniging(&self, vcode: &VCode) -> Result<VerenigingSnapshot, RegistryError> {
        let path = member_path(&[vcode.as_str()]);
        let response = self.read(&path).await?;

        let etag = header_str(&response, header::ETAG.as_str())
            .ok_or_else(|| RegistryError::fetch(&path, "response carries no ETag"))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| RegistryError::fetch(&path, e))?;
        let envelope: VerenigingEnvelope =
            serde_json::from_value(body.clone()).map_err(|e| RegistryError::fetch(&path, e))?;

        Ok(VerenigingSnapshot {
            vereniging: envelope.vereniging,
            etag,
            body,
        })
    }

    pub async fn get_historiek(&self, vcode: &VCode) -> Result<Value, RegistryError> {
        let path = member_path(&[vcode.as_str(), "historiek"]);
        self.read(&path)
            .await?
            .json()
            .await
            .map_err(|e| RegistryError::fetch(&path, e))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub async fn update_vereniging(
        &self,
        vcode: &VCode,
        data: &Value,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        let path = member_path(&[vcode.as_str()]);
        self.write(Method::PATCH, &path, Some(data.clone()), etag)
            .await
    }

    pub async fn update_vereniging_kbo(
        &self,
        vcode: &VCode,
        data: &Value,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        let path = member_path(&[vcode.as_str(), "kbo"]);
        self.write(Method::PATCH, &path, Some(data.clone()), etag)
            .await
    }

    pub async fn add_locatie(
        &self,
        vcode: &VCode,
        locatie: &Value,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        let body = json!({ "locatie": locatie });
        let path = member_path(&[vcode.as_str(), "locaties"]);
        self.write(Method::POST, &path, Some(body), etag)
            .await
    }

    pub async fn add_contactgegeven(
        &self,
        vcode: &VCode,
        contactgegeven: &Value,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        let body = json!({ "contactgegeven": contactgegeven });
        let path = member_path(&[vcode.as_str(), "contactgegevens"]);
        self.write(Method::POST, &path, Some(body), etag)
            .await
    }

    pub async fn update_contactgegeven(
        &self,
        vcode: &VCode,
        contactgegeven_id: &str,
        contactgegeven: &Value,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        let body = json!({ "contactgegeven": contactgegeven });
        let path = member_path(&[vcode.as_str(), "contactgegevens", contactgegeven_id]);
        self.write(Method::PATCH, &path, Some(body), etag).await
    }

    pub async fn delete_contactgegeven(
        &self,
        vcode: &VCode,
        contactgegeven_id: &str,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        let path = member_path(&[vcode.as_str(), "contactgegevens", contactgegeven_id]);
        self.write(Method::DELETE, &path, None, etag).await
    }

    pub async fn update_contactgegeven_kbo(
        &self,
        vcode: &VCode,
        contactgegeven_id: &str,
        contactgegeven: &Value,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        let body = json!({ "contactgegeven": contactgegeven });
        let path = member_path(&[vcode.as_str(), "kbo", "contactgegevens", contactgegeven_id]);
        self.write(Method::PATCH, &path, Some(body), etag).await
    }

    pub async fn add_lidmaatschap(
        &self,
        vcode: &VCode,
        lidmaatschap: &Value,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        let path = member_path(&[vcode.as_str(), "lidmaatschappen"]);
        self.write(Method::POST, &path, Some(lidmaatschap.clone()), etag)
            .await
    }
}

#[async_trait]
impl RegistryApi for VerenigingenClient {
    async fn get_vereniging(&self, vcode: &VCode) -> Result<VerenigingSnapshot, RegistryError> {
        VerenigingenClient::get_vereniging(self, vcode).await
    }

    async fn update_locatie(
        &self,
        vcode: &VCode,
        locatie_id: &str,
        adres: &AttributeMap,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        let body = json!({ "locatie": { "adres": adres } });
        let path = member_path(&[vcode.as_str(), "locaties", locatie_id]);
        self.write(Method::PATCH, &path, Some(body), etag).await
    }

    async fn update_maatschappelijke_zetel(
        &self,
        vcode: &VCode,
        locatie_id: &str,
        locatie: &Value,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        let body = json!({ "locatie": locatie });
        let path = member_path(&[vcode.as_str(), "kbo", "locaties", locatie_id]);
        self.write(Method::PATCH, &path, Some(body), etag).await
    }

    async fn delete_locatie(
        &self,
        vcode: &VCode,
        locatie_id: &str,
        etag: &str,
    ) -> Result<WriteReceipt, RegistryError> {
        let path = member_path(&[vcode.as_str(), "locaties", locatie_id]);
        self.write(Method::DELETE, &path, None, etag).await
    }
}

/// Path below `/v1/verenigingen/`, each segment percent-encoded
fn member_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|segment| urlencoding::encode(segment))
        .collect::<Vec<_>>()
        .join("/")
}

fn header_str(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
