//! Shared API models
//!
//! Adapter services speak JSON:API to their callers, so errors leave the
//! service as a JSON:API error document rather than an ad-hoc envelope.

use serde::{Deserialize, Serialize};

/// Media type of every JSON:API request and response body
pub const JSON_API_CONTENT_TYPE: &str = "application/vnd.api+json";

// ============================================================================
// JSON:API Error Models
// ============================================================================

/// A single JSON:API error object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// HTTP status code, as a string per JSON:API
    pub status: String,
    /// Application-specific error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short, human-readable summary
    pub title: String,
    /// Explanation specific to this occurrence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorObject {
    /// Create a new error object
    pub fn new(status: u16, title: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            code: None,
            title: title.into(),
            detail: None,
        }
    }

    /// Set the application error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Add details
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Top-level JSON:API error document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorObject>,
}

// ============================================================================
// AppError - HTTP Error with proper status codes (requires axum feature)
// ============================================================================

#[cfg(feature = "axum")]
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};

/// Application error with HTTP status code
/// This type implements IntoResponse for seamless integration with axum handlers
#[cfg(feature = "axum")]
#[derive(Debug, Clone)]
pub struct AppError {
    /// HTTP status code
    pub status: StatusCode,
    /// Error information
    pub error: ErrorObject,
}

#[cfg(feature = "axum")]
impl AppError {
    /// Create a new error with the given status and title
    pub fn new(status: StatusCode, title: impl Into<String>) -> Self {
        Self {
            status,
            error: ErrorObject::new(status.as_u16(), title),
        }
    }

    /// Create a 400 Bad Request error
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Invalid request").with_detail(detail)
    }

    /// Create a 404 Not Found error
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found").with_detail(detail)
    }

    /// Create a 409 Conflict error
    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "Conflict").with_detail(detail)
    }

    /// Create a 500 Internal Server Error
    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Server error").with_detail(detail)
    }

    /// Create a 502 Bad Gateway error
    pub fn bad_gateway(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "Upstream error").with_detail(detail)
    }

    /// Create a 503 Service Unavailable error
    pub fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable").with_detail(detail)
    }

    /// Set the application error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error = self.error.with_code(code);
        self
    }

    /// Add details to the error
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.error = self.error.with_detail(detail);
        self
    }
}

#[cfg(feature = "axum")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, JSON_API_CONTENT_TYPE)],
            Json(ErrorDocument {
                errors: vec![self.error],
            }),
        )
            .into_response()
    }
}

#[cfg(feature = "axum")]
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal_error(err.to_string())
    }
}

/// JSON body served with the JSON:API media type
#[cfg(feature = "axum")]
#[derive(Debug, Clone)]
pub struct JsonApi<T>(pub T);

#[cfg(feature = "axum")]
impl<T> IntoResponse for JsonApi<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        (
            [(header::CONTENT_TYPE, JSON_API_CONTENT_TYPE)],
            Json(self.0),
        )
            .into_response()
    }
}

#[cfg(all(test, feature = "axum"))]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_app_error_renders_json_api_document() {
        let response = AppError::conflict("address drifted")
            .with_code("ADDRESS_CONFLICT")
            .into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            JSON_API_CONTENT_TYPE
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let doc: ErrorDocument = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc.errors.len(), 1);
        assert_eq!(doc.errors[0].status, "409");
        assert_eq!(doc.errors[0].code.as_deref(), Some("ADDRESS_CONFLICT"));
        assert_eq!(doc.errors[0].detail.as_deref(), Some("address drifted"));
    }

    #[test]
    fn test_error_object_skips_empty_fields() {
        let value = serde_json::to_value(ErrorObject::new(400, "Invalid request")).unwrap();
        assert_eq!(value, serde_json::json!({"status": "400", "title": "Invalid request"}));
    }
}
