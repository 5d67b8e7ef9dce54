//! JSON-LD prefix expansion endpoint

use std::sync::Arc;

use axum::extract::State;
use bytes::Bytes;
use common::{AppError, JsonApi};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::parse_json_body;
use crate::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct ResolveUriRequest {
    pub value: String,
    #[serde(default)]
    pub document: Value,
}

/// @route POST /uris/resolve
/// @input `{value: "cont:1234", document: {"@context": ...}}`
/// @output `{value, uri}`; `uri` is null when the value cannot be expanded
pub async fn resolve_uri(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<JsonApi<Value>, AppError> {
    let request: ResolveUriRequest = serde_json::from_value(parse_json_body(&body)?)
        .map_err(|e| AppError::bad_request(format!("Invalid resolve request: {}", e)))?;

    let uri = state
        .uri_resolver
        .full_uri(&request.value, &request.document)
        .await
        .map_err(|e| {
            AppError::new(e.status_code(), "Upstream error")
                .with_code("CONTEXT_FETCH_ERROR")
                .with_detail(e.to_string())
        })?;

    Ok(JsonApi(json!({ "value": request.value, "uri": uri })))
}
