//! Shared setup for router tests: wiremock stands in for the resources
//! service and the registry, tokens come from a fixed provider

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vrsrv::auth::{AuthError, AuthHealth, AuthStatus, TokenProvider};
use vrsrv::bootstrap::create_app_state_with_tokens;
use vrsrv::routes::create_routes;
use vrsrv::VrsrvConfig;

pub const TOKEN: &str = "test-token";
pub const ETAG: &str = "W/\"42\"";

/// Always hands out [`TOKEN`]
pub struct StaticTokens;

#[async_trait]
impl TokenProvider for StaticTokens {
    async fn access_token(&self) -> Result<String, AuthError> {
        Ok(TOKEN.to_string())
    }

    fn health(&self) -> AuthHealth {
        AuthHealth {
            status: AuthStatus::Ok,
            last_checked: Some(chrono::Utc::now()),
            details: None,
        }
    }
}

/// Token endpoint permanently rejecting the client
pub struct RejectedTokens;

#[async_trait]
impl TokenProvider for RejectedTokens {
    async fn access_token(&self) -> Result<String, AuthError> {
        Err(AuthError::Rejected {
            status: 401,
            body: "invalid_client".to_string(),
        })
    }

    fn health(&self) -> AuthHealth {
        AuthHealth {
            status: AuthStatus::Error,
            last_checked: Some(chrono::Utc::now()),
            details: Some("token endpoint returned HTTP 401: invalid_client".to_string()),
        }
    }
}

pub struct TestEnv {
    pub store: MockServer,
    pub registry: MockServer,
    pub app: Router,
}

pub async fn setup() -> TestEnv {
    setup_with_tokens(Arc::new(StaticTokens)).await
}

pub async fn setup_with_tokens(tokens: Arc<dyn TokenProvider>) -> TestEnv {
    let store = MockServer::start().await;
    let registry = MockServer::start().await;

    let mut config = VrsrvConfig::default();
    config.local_store.url = store.uri();
    config.registry.url = registry.uri();
    config.registry.initiator = Some("OVO000000".to_string());
    config.forward.resources_url = store.uri();
    config.local_store.timeout_secs = 2;
    config.registry.timeout_secs = 2;
    config.forward.timeout_secs = 2;

    let state = create_app_state_with_tokens(config, tokens).unwrap();
    TestEnv {
        store,
        registry,
        app: create_routes(state),
    }
}

pub fn association_document(vcode: &str) -> Value {
    json!({
        "data": [{"type": "associations", "id": "as1"}],
        "included": [
            {
                "type": "identifiers",
                "id": "i1",
                "attributes": {"id-name": "vCode"},
                "relationships": {
                    "structured-identifier": {"data": {"type": "structured-identifiers", "id": "s1"}}
                }
            },
            {"type": "structured-identifiers", "id": "s1", "attributes": {"local-id": vcode}}
        ]
    })
}

/// Association lookup for an address id
pub async fn mount_association(store: &MockServer, address_id: &str, document: Value) {
    Mock::given(method("GET"))
        .and(path("/associations"))
        .and(query_param("filter[primary-site][address][:id:]", address_id))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(store)
        .await;
}

/// Stored local address
pub async fn mount_address(store: &MockServer, id: &str, attributes: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/addresses/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"type": "addresses", "id": id, "attributes": attributes}
        })))
        .mount(store)
        .await;
}

pub async fn mount_vereniging(registry: &MockServer, vcode: &str, locaties: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/verenigingen/{}", vcode)))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", ETAG)
                .set_body_json(json!({
                    "vereniging": {"vCode": vcode, "naam": "De Eendracht", "locaties": locaties}
                })),
        )
        .mount(registry)
        .await;
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| json!(String::from_utf8_lossy(&bytes)))
    };
    (status, body)
}

/// JSON:API request with an optional body
pub async fn json_request(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/vnd.api+json")
        .header("mu-session-id", "http://mu.semte.ch/sessions/test");
    let request = match body {
        Some(json) => builder.body(Body::from(json.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    send(app, request).await
}

pub fn address_patch(id: &str, attributes: Value) -> Value {
    json!({"data": {"type": "addresses", "id": id, "attributes": attributes}})
}
