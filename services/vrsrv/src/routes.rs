//! Route table

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use common::logging::http_request_logger;

use crate::api::address_handlers::{delete_address, update_address};
use crate::api::health_handlers::{health_check, hello};
use crate::api::uri_handlers::resolve_uri;
use crate::app_state::AppState;
use crate::forward::forward_fallback;

/// Adapter routes; everything else, including other methods on
/// `/addresses/{id}`, goes to the resources service
pub fn create_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/health", get(health_check))
        .route(
            "/addresses/{id}",
            patch(update_address)
                .delete(delete_address)
                .fallback(forward_fallback),
        )
        .route("/uris/resolve", post(resolve_uri))
        .fallback(forward_fallback)
        .layer(middleware::from_fn(http_request_logger))
        .with_state(state)
}
