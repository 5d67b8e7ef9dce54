//! Resolve the registry vCode of the association owning a local resource
//!
//! The local store keeps the vCode two hops away from the association:
//! `associations → identifiers (id-name = "vCode") → structured-identifiers
//! (local-id)`. One filtered list call with `include` brings every hop into
//! the `included` side table, so the lookup is done in memory.

use std::fmt;

use axum::http::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::jsonapi::{Document, LocalStore, LocalStoreError, QueryParams, RequestContext};

pub const ASSOCIATIONS: &str = "associations";
const IDENTIFIERS: &str = "identifiers";
const STRUCTURED_IDENTIFIERS: &str = "structured-identifiers";
const VCODE_ID_NAME: &str = "vCode";
const INCLUDE: &[&str] = &["identifiers.structured-identifier", "contact-points"];

/// Stable registry identifier of an association
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VCode(String);

impl VCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the local resource hangs off the association
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipPath {
    /// `association → contact-points`
    ContactPoints,
    /// `association → primary-site → address`
    PrimarySiteAddress,
}

impl RelationshipPath {
    pub fn segments(self) -> &'static [&'static str] {
        match self {
            Self::ContactPoints => &["contact-points"],
            Self::PrimarySiteAddress => &["primary-site", "address"],
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("expected exactly one association for {id}, found none")]
    NoAssociation { id: String },

    #[error("expected exactly one association for {id}, found {count}")]
    AmbiguousAssociation { id: String, count: usize },

    #[error("no vCode found for association {association}")]
    VCodeNotFound { association: String },

    #[error(transparent)]
    LocalStore(#[from] LocalStoreError),
}

impl ResolutionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoAssociation { .. } | Self::VCodeNotFound { .. } => StatusCode::NOT_FOUND,
            Self::AmbiguousAssociation { .. } => StatusCode::BAD_REQUEST,
            Self::LocalStore(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Find the vCode of the single association that owns `local_id`
pub async fn resolve_association(
    store: &dyn LocalStore,
    local_id: &str,
    path: RelationshipPath,
    ctx: &RequestContext,
) -> Result<VCode, ResolutionError> {
    let params = QueryParams::new()
        .include(INCLUDE)
        .filter_id(path.segments(), local_id);

    let document = store.list(ASSOCIATIONS, &params, ctx).await?;

    let associations = document.resources();
    let association = match associations.as_slice() {
        [one] => *one,
        [] => {
            return Err(ResolutionError::NoAssociation {
                id: local_id.to_string(),
            })
        },
        many => {
            return Err(ResolutionError::AmbiguousAssociation {
                id: local_id.to_string(),
                count: many.len(),
            })
        },
    };

    let association_id = association.id.clone().unwrap_or_default();
    let vcode = extract_vcode(&document).ok_or_else(|| ResolutionError::VCodeNotFound {
        association: association_id.clone(),
    })?;

    debug!("Resolved {} via {:?} to {} ({})", local_id, path, vcode, association_id);
    Ok(vcode)
}

/// Walk `identifiers → structured-identifier → local-id` through `included`
pub fn extract_vcode(document: &Document) -> Option<VCode> {
    let identifier = document.included.iter().find(|item| {
        item.is(IDENTIFIERS) && item.attribute_str("id-name") == Some(VCODE_ID_NAME)
    })?;

    let link = identifier.relationship("structured-identifier")?.single()?;
    let structured = document.find_included(STRUCTURED_IDENTIFIERS, &link.id)?;

    structured
        .attribute_str("local-id")
        .filter(|code| !code.is_empty())
        .map(VCode::new)
}
