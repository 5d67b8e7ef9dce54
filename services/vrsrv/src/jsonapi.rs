//! JSON:API client for the local resource store
//!
//! A single [`JsonApiClient`] serves every resource collection through
//! [`JsonApiClient::resource`], which hands out a [`ResourceClient`] bound to
//! one collection name. Callers that need the caller's session forwarded
//! attach a [`RequestContext`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use common::JSON_API_CONTENT_TYPE;
use reqwest::{header, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::mapping::AttributeMap;

// ============================================================================
// Document model
// ============================================================================

/// `{type, id}` pair used in relationship linkage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl ResourceIdentifier {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// Relationship linkage: to-one or to-many
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    Many(Vec<ResourceIdentifier>),
    One(ResourceIdentifier),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(default)]
    pub data: Option<Linkage>,
}

impl Relationship {
    /// Target of a to-one relationship
    pub fn single(&self) -> Option<&ResourceIdentifier> {
        match &self.data {
            Some(Linkage::One(id)) => Some(id),
            _ => None,
        }
    }
}

/// One JSON:API resource object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "AttributeMap::is_empty")]
    pub attributes: AttributeMap,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Relationship>,
}

impl Resource {
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(Value::as_str)
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }
}

/// Primary data of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    Many(Vec<Resource>),
    One(Box<Resource>),
}

/// Top-level JSON:API document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub data: Option<PrimaryData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
}

impl Document {
    /// Primary resources as a list; `null` data yields an empty list
    pub fn resources(&self) -> Vec<&Resource> {
        match &self.data {
            Some(PrimaryData::Many(items)) => items.iter().collect(),
            Some(PrimaryData::One(item)) => vec![item.as_ref()],
            None => Vec::new(),
        }
    }

    /// The single primary resource of a `get` response
    pub fn single(&self) -> Option<&Resource> {
        match &self.data {
            Some(PrimaryData::One(item)) => Some(item),
            _ => None,
        }
    }

    pub fn find_included(&self, kind: &str, id: &str) -> Option<&Resource> {
        self.included
            .iter()
            .find(|r| r.is(kind) && r.id.as_deref() == Some(id))
    }
}

// ============================================================================
// Query parameters and forwarded context
// ============================================================================

/// Ordered query string parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// `include=a.b,c`
    pub fn include(mut self, paths: &[&str]) -> Self {
        self.pairs.push(("include".to_string(), paths.join(",")));
        self
    }

    /// Exact-id filter on a (nested) relationship path:
    /// `["primary-site", "address"]` → `filter[primary-site][address][:id:]`
    pub fn filter_id(mut self, path: &[&str], id: impl Into<String>) -> Self {
        let key = path
            .iter()
            .fold(String::from("filter"), |acc, segment| format!("{acc}[{segment}]"));
        self.pairs.push((format!("{key}[:id:]"), id.into()));
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

/// Headers of the inbound request that identify the caller to the store
pub const FORWARDED_HEADERS: &[&str] = &[
    "mu-session-id",
    "mu-call-id",
    "mu-auth-allowed-groups",
    "mu-auth-used-groups",
    "authorization",
];

/// Session headers forwarded unchanged on every local-store call
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let headers = FORWARDED_HEADERS
            .iter()
            .filter_map(|name| {
                headers
                    .get(*name)
                    .map(|value| (HeaderName::from_static(*name), value.clone()))
            })
            .collect();
        Self { headers }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    fn apply(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        request
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum LocalStoreError {
    #[error("local store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("local store unreachable: {0}")]
    Transport(String),

    #[error("invalid local store response: {0}")]
    InvalidResponse(String),
}

impl LocalStoreError {
    /// Whether the store reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

impl From<reqwest::Error> for LocalStoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Operations the reconciliation flow needs from the local store
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn list(
        &self,
        resource: &str,
        params: &QueryParams,
        ctx: &RequestContext,
    ) -> Result<Document, LocalStoreError>;

    async fn get(
        &self,
        resource: &str,
        id: &str,
        params: &QueryParams,
        ctx: &RequestContext,
    ) -> Result<Document, LocalStoreError>;

    async fn update(
        &self,
        resource: &str,
        id: &str,
        attributes: AttributeMap,
        ctx: &RequestContext,
    ) -> Result<Option<Document>, LocalStoreError>;

    async fn delete(
        &self,
        resource: &str,
        id: &str,
        ctx: &RequestContext,
    ) -> Result<(), LocalStoreError>;
}

/// HTTP client for a JSON:API resource service
#[derive(Debug, Clone)]
pub struct JsonApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl JsonApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LocalStoreError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LocalStoreError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Client bound to one resource collection, e.g. `"associations"`
    pub fn resource(&self, name: impl Into<String>) -> ResourceClient<'_> {
        ResourceClient {
            client: self,
            name: name.into(),
            context: RequestContext::default(),
        }
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        params: &QueryParams,
        body: Option<Value>,
        ctx: &RequestContext,
    ) -> Result<Option<Document>, LocalStoreError> {
        debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method, &url)
            .header(header::ACCEPT, JSON_API_CONTENT_TYPE)
            .query(params.pairs());
        request = ctx.apply(request);
        if let Some(body) = body {
            request = request
                .header(header::CONTENT_TYPE, JSON_API_CONTENT_TYPE)
                .body(body.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LocalStoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| LocalStoreError::InvalidResponse(e.to_string()))
    }
}

/// CRUD operations on one resource collection
#[derive(Debug, Clone)]
pub struct ResourceClient<'a> {
    client: &'a JsonApiClient,
    name: String,
    context: RequestContext,
}

impl ResourceClient<'_> {
    /// Forward the caller's session headers on every request
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.client.base_url, self.name)
    }

    fn member_url(&self, id: &str) -> String {
        format!("{}/{}", self.collection_url(), urlencoding::encode(id))
    }

    pub async fn list(&self, params: &QueryParams) -> Result<Document, LocalStoreError> {
        self.client
            .send(Method::GET, self.collection_url(), params, None, &self.context)
            .await
            .map(Option::unwrap_or_default)
    }

    pub async fn get(&self, id: &str, params: &QueryParams) -> Result<Document, LocalStoreError> {
        self.client
            .send(Method::GET, self.member_url(id), params, None, &self.context)
            .await
            .map(Option::unwrap_or_default)
    }

    pub async fn create(
        &self,
        attributes: AttributeMap,
        relationships: BTreeMap<String, Linkage>,
    ) -> Result<Option<Document>, LocalStoreError> {
        let payload = self.payload(None, attributes, relationships)?;
        self.client
            .send(
                Method::POST,
                self.collection_url(),
                &QueryParams::new(),
                Some(payload),
                &self.context,
            )
            .await
    }

    pub async fn update(
        &self,
        id: &str,
        attributes: AttributeMap,
        relationships: BTreeMap<String, Linkage>,
    ) -> Result<Option<Document>, LocalStoreError> {
        let payload = self.payload(Some(id), attributes, relationships)?;
        self.client
            .send(
                Method::PATCH,
                self.member_url(id),
                &QueryParams::new(),
                Some(payload),
                &self.context,
            )
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), LocalStoreError> {
        self.client
            .send(
                Method::DELETE,
                self.member_url(id),
                &QueryParams::new(),
                None,
                &self.context,
            )
            .await
            .map(|_| ())
    }

    fn payload(
        &self,
        id: Option<&str>,
        attributes: AttributeMap,
        relationships: BTreeMap<String, Linkage>,
    ) -> Result<Value, LocalStoreError> {
        let resource = Resource {
            kind: self.name.clone(),
            id: id.map(str::to_string),
            attributes,
            relationships: relationships
                .into_iter()
                .map(|(name, data)| (name, Relationship { data: Some(data) }))
                .collect(),
        };
        serde_json::to_value(&resource)
            .map(|data| serde_json::json!({ "data": data }))
            .map_err(|e| LocalStoreError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LocalStore for JsonApiClient {
    async fn list(
        &self,
        resource: &str,
        params: &QueryParams,
        ctx: &RequestContext,
    ) -> Result<Document, LocalStoreError> {
        self.resource(resource)
            .with_context(ctx.clone())
            .list(params)
            .await
    }

    async fn get(
        &self,
        resource: &str,
        id: &str,
        params: &QueryParams,
        ctx: &RequestContext,
    ) -> Result<Document, LocalStoreError> {
        self.resource(resource)
            .with_context(ctx.clone())
            .get(id, params)
            .await
    }

    async fn update(
        &self,
        resource: &str,
        id: &str,
        attributes: AttributeMap,
        ctx: &RequestContext,
    ) -> Result<Option<Document>, LocalStoreError> {
        self.resource(resource)
            .with_context(ctx.clone())
            .update(id, attributes, BTreeMap::new())
            .await
    }

    async fn delete(
        &self,
        resource: &str,
        id: &str,
        ctx: &RequestContext,
    ) -> Result<(), LocalStoreError> {
        self.resource(resource)
            .with_context(ctx.clone())
            .delete(id)
            .await
    }
}
