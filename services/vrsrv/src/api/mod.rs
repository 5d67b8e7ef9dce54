//! HTTP handlers

pub mod address_handlers;
pub mod health_handlers;
pub mod uri_handlers;

use bytes::Bytes;
use common::AppError;
use serde_json::Value;

/// Parse a request body as JSON, answering malformed bodies with a JSON:API
/// 400 instead of the extractor's plain-text rejection
pub(crate) fn parse_json_body(body: &Bytes) -> Result<Value, AppError> {
    if body.is_empty() {
        return Err(AppError::bad_request("Request body is empty"));
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::bad_request(format!("Request body is not valid JSON: {}", e)))
}
