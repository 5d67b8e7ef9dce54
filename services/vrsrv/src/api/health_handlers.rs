//! Liveness endpoints

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::auth::AuthStatus;

/// @route GET /hello
pub async fn hello() -> &'static str {
    "Hello verenigingsregister-api-adapter-service"
}

/// Service health, driven by the outcome of the last token acquisition
///
/// @route GET /health
/// @output 200 unless the last token request failed, then 503
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let auth = state.tokens.health();
    let (status, label) = match auth.status {
        AuthStatus::Error => (StatusCode::SERVICE_UNAVAILABLE, "ERROR"),
        AuthStatus::Ok | AuthStatus::Unknown => (StatusCode::OK, "OK"),
    };

    (
        status,
        Json(json!({
            "status": label,
            "service": state.config.service.name,
            "auth": auth,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
