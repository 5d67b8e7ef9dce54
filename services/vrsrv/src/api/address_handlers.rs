//! `addresses` endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use bytes::Bytes;
use common::{AppError, JsonApi};
use serde_json::{json, Value};
use tracing::info;

use crate::api::parse_json_body;
use crate::app_state::AppState;
use crate::jsonapi::RequestContext;
use crate::mapping::AttributeMap;
use crate::reconcile::ADDRESSES;

/// Attributes a client may change; the rest is ignored
pub const UPDATABLE_ATTRIBUTES: &[&str] = &[
    "number",
    "box-number",
    "street",
    "postcode",
    "municipality",
    "country",
];

/// Check the JSON:API envelope and keep the updatable attributes that carry
/// a value; `null` counts as not sent
pub fn validate_update(path_id: &str, body: &Value) -> Result<AttributeMap, AppError> {
    let data = body.get("data");
    let kind = data.and_then(|d| d.get("type")).and_then(Value::as_str);
    let id = data.and_then(|d| d.get("id")).and_then(Value::as_str);

    let id = match (kind, id) {
        (Some(ADDRESSES), Some(id)) if !id.is_empty() => id,
        _ => {
            return Err(AppError::bad_request(
                "Request must include data.type='addresses' and data.id",
            ))
        },
    };
    if id != path_id {
        return Err(AppError::new(StatusCode::BAD_REQUEST, "ID mismatch")
            .with_detail("ID in URL must match ID in request body"));
    }

    let attributes = data
        .and_then(|d| d.get("attributes"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    Ok(UPDATABLE_ATTRIBUTES
        .iter()
        .filter_map(|key| {
            attributes
                .get(*key)
                .filter(|value| !value.is_null())
                .map(|value| (key.to_string(), value.clone()))
        })
        .collect())
}

/// @route PATCH /addresses/{id}
/// @input JSON:API document `{data: {type: "addresses", id, attributes}}`
/// @output 200 with the written resource
/// @side-effects Registry location update, then local address update
pub async fn update_address(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<JsonApi<Value>, AppError> {
    let body = parse_json_body(&body)?;
    let attributes = validate_update(&id, &body)?;
    let ctx = RequestContext::from_headers(&headers);

    let outcome = state.adapter.update_address(&id, attributes, &ctx).await?;
    info!(
        "Address {} synced to {} location {}",
        id, outcome.vcode, outcome.locatie_id
    );

    Ok(JsonApi(json!({
        "data": {
            "type": ADDRESSES,
            "id": id,
            "attributes": outcome.attributes,
        }
    })))
}

/// @route DELETE /addresses/{id}
/// @output 204
/// @side-effects Registry location delete, then local address delete
pub async fn delete_address(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let ctx = RequestContext::from_headers(&headers);
    state.adapter.delete_address(&id, &ctx).await?;
    info!("Address {} removed from registry and local store", id);
    Ok(StatusCode::NO_CONTENT)
}
