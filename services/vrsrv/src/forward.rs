//! Pass-through of every request the adapter does not handle itself to the
//! local resources service

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    response::{IntoResponse, Response},
};
use common::AppError;
use thiserror::Error;
use tracing::{debug, error};

use crate::app_state::AppState;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("forwarding to {url} failed: {reason}")]
    Upstream { url: String, reason: String },

    #[error("failed to build response: {0}")]
    Response(String),
}

impl From<ForwardError> for AppError {
    fn from(err: ForwardError) -> Self {
        match err {
            ForwardError::Body(_) => AppError::bad_request(err.to_string()),
            ForwardError::Upstream { .. } => {
                AppError::bad_gateway(err.to_string()).with_code("FORWARDING_ERROR")
            },
            ForwardError::Response(_) => AppError::internal_error(err.to_string()),
        }
    }
}

pub struct Forwarder {
    base_url: String,
    http: reqwest::Client,
}

impl Forwarder {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ForwardError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForwardError::Upstream {
                url: base_url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Target URL: base + original path and query
    pub fn target_url(&self, req: &Request) -> String {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("{}{}", self.base_url, path_and_query)
    }

    pub async fn forward(&self, req: Request) -> Result<Response, ForwardError> {
        let url = self.target_url(&req);
        let (parts, body) = req.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| ForwardError::Body(e.to_string()))?;

        debug!("Forwarding {} {}", parts.method, url);

        let mut upstream = self.http.request(parts.method, &url).body(body);
        for (name, value) in &parts.headers {
            if name != header::HOST && name != header::CONTENT_LENGTH {
                upstream = upstream.header(name, value);
            }
        }

        let resp = upstream.send().await.map_err(|e| ForwardError::Upstream {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let mut response = Response::builder().status(resp.status());
        for (name, value) in resp.headers() {
            if name != header::CONNECTION && name != header::TRANSFER_ENCODING {
                response = response.header(name, value);
            }
        }

        let body = resp.bytes().await.map_err(|e| ForwardError::Upstream {
            url,
            reason: e.to_string(),
        })?;
        response
            .body(Body::from(body))
            .map_err(|e| ForwardError::Response(e.to_string()))
    }
}

/// Router fallback
pub async fn forward_fallback(State(state): State<Arc<AppState>>, req: Request) -> Response {
    match state.forwarder.forward(req).await {
        Ok(response) => response,
        Err(e) => {
            error!("Forwarding failed: {}", e);
            AppError::from(e).into_response()
        },
    }
}
