//! Shared service library
//!
//! Provides the plumbing every adapter service needs, including:
//! - logging initialisation and HTTP access logging
//! - JSON:API error envelopes and response wrappers
//! - service bootstrap helpers and shutdown signalling

pub mod api_types;
pub mod logging;
pub mod serde_helpers;
pub mod service_bootstrap;

// Re-export commonly used API types
pub use api_types::{ErrorDocument, ErrorObject, JSON_API_CONTENT_TYPE};

#[cfg(feature = "axum")]
pub use api_types::{AppError, JsonApi};

// Re-export common dependencies
pub use anyhow;
pub use serde_json;
