//! Address reconciliation between the local store and the registry
//!
//! Update flow:
//! 1. resolve the owning association's vCode in the local store
//! 2. fetch the vereniging and its ETag from the registry
//! 3. select the primary location
//! 4. compare the stored local address with the primary location's `adres`
//! 5. map the new attributes to registry names
//! 6. write to the registry with `If-Match`, then update the local store
//!
//! Delete runs steps 1-4, deletes the registry location, and only then the
//! local address.

use std::sync::Arc;

use axum::http::StatusCode;
use common::AppError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::conflict::{diff, ConflictReport};
use crate::jsonapi::{LocalStore, LocalStoreError, QueryParams, RequestContext};
use crate::location::{select_primary, Location};
use crate::mapping::{map_values, AttributeMap, FieldMapping};
use crate::registry::{RegistryApi, RegistryError, VerenigingSnapshot, WriteReceipt};
use crate::resolver::{resolve_association, RelationshipPath, ResolutionError, VCode};

pub const ADDRESSES: &str = "addresses";

/// What to do when the stored local address no longer matches the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Refuse the write
    #[default]
    Block,
    /// Log the drift and write anyway
    LogOnly,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("no address attributes to update")]
    EmptyUpdate,

    #[error("address {0} not found in the local store")]
    AddressNotFound(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("association {vcode} has no location to update")]
    NoPrimaryLocation { vcode: VCode },

    #[error("address {id} differs from the registry: {}", .report.summary())]
    Conflict { id: String, report: ConflictReport },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("local store update failed: {0}")]
    LocalStore(#[from] LocalStoreError),
}

impl ReconcileError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyUpdate => StatusCode::BAD_REQUEST,
            Self::AddressNotFound(_) => StatusCode::NOT_FOUND,
            Self::Resolution(e) => e.status_code(),
            Self::NoPrimaryLocation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Registry(e) => e.status_code(),
            Self::LocalStore(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyUpdate => "EMPTY_UPDATE",
            Self::AddressNotFound(_) => "ADDRESS_NOT_FOUND",
            Self::Resolution(ResolutionError::NoAssociation { .. }) => "ASSOCIATION_NOT_FOUND",
            Self::Resolution(ResolutionError::AmbiguousAssociation { .. }) => {
                "AMBIGUOUS_ASSOCIATION"
            },
            Self::Resolution(ResolutionError::VCodeNotFound { .. }) => "VCODE_NOT_FOUND",
            Self::Resolution(ResolutionError::LocalStore(_)) | Self::LocalStore(_) => {
                "LOCAL_STORE_ERROR"
            },
            Self::NoPrimaryLocation { .. } => "NO_PRIMARY_LOCATION",
            Self::Conflict { .. } => "ADDRESS_CONFLICT",
            Self::Registry(RegistryError::ConcurrencyConflict { .. }) => "CONCURRENCY_CONFLICT",
            Self::Registry(RegistryError::RemoteFetch { .. }) => "REMOTE_FETCH_ERROR",
            Self::Registry(RegistryError::Auth(_)) => "AUTH_ERROR",
            Self::Registry(_) => "REMOTE_WRITE_ERROR",
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        let status = err.status_code();
        let title = match status {
            StatusCode::BAD_REQUEST => "Invalid request",
            StatusCode::NOT_FOUND => "Not found",
            StatusCode::CONFLICT => "Conflict",
            StatusCode::PRECONDITION_FAILED => "Stale association",
            StatusCode::UNPROCESSABLE_ENTITY => "Unprocessable address",
            StatusCode::SERVICE_UNAVAILABLE => "Service unavailable",
            _ => "Upstream error",
        };
        AppError::new(status, title)
            .with_code(err.code())
            .with_detail(err.to_string())
    }
}

/// Result of a successful address update
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub vcode: VCode,
    pub locatie_id: String,
    /// Local attributes written to both sides
    pub attributes: AttributeMap,
    pub receipt: WriteReceipt,
    pub report: ConflictReport,
}

/// Association, its primary location and the local/remote comparison
struct Verified {
    vcode: VCode,
    snapshot: VerenigingSnapshot,
    primary: Location,
    report: ConflictReport,
}

pub struct Adapter {
    store: Arc<dyn LocalStore>,
    registry: Arc<dyn RegistryApi>,
    mapping: FieldMapping,
    inverse: FieldMapping,
    policy: ConflictPolicy,
}

impl Adapter {
    pub fn new(
        store: Arc<dyn LocalStore>,
        registry: Arc<dyn RegistryApi>,
        policy: ConflictPolicy,
    ) -> Self {
        let mapping = FieldMapping::address();
        Self {
            store,
            registry,
            inverse: mapping.inverse(),
            mapping,
            policy,
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Push new address attributes (local names) to the registry's primary
    /// location, then store them locally
    pub async fn update_address(
        &self,
        id: &str,
        attributes: AttributeMap,
        ctx: &RequestContext,
    ) -> Result<UpdateOutcome, ReconcileError> {
        let adres = map_values(&attributes, &self.mapping);
        if adres.is_empty() {
            return Err(ReconcileError::EmptyUpdate);
        }
        // The local write carries exactly the fields the registry receives
        let local = map_values(&adres, &self.inverse);

        let verified = self.verify(id, ctx).await?;
        let Verified {
            vcode,
            snapshot,
            primary,
            report,
        } = verified;

        let receipt = if primary.is_kbo_seat() {
            self.registry
                .update_maatschappelijke_zetel(
                    &vcode,
                    &primary.locatie_id,
                    &json!({ "adres": adres }),
                    &snapshot.etag,
                )
                .await?
        } else {
            self.registry
                .update_locatie(&vcode, &primary.locatie_id, &adres, &snapshot.etag)
                .await?
        };
        info!(
            "Updated location {} of {} (sequence {:?})",
            primary.locatie_id, vcode, receipt.sequence
        );

        if let Err(e) = self
            .store
            .update(ADDRESSES, id, local.clone(), ctx)
            .await
        {
            error!(
                "Registry location {} of {} updated but local address {} was not: {}",
                primary.locatie_id, vcode, id, e
            );
            return Err(e.into());
        }

        Ok(UpdateOutcome {
            vcode,
            locatie_id: primary.locatie_id,
            attributes: local,
            receipt,
            report,
        })
    }

    /// Delete the registry location backing a local address, then the
    /// address itself
    pub async fn delete_address(
        &self,
        id: &str,
        ctx: &RequestContext,
    ) -> Result<WriteReceipt, ReconcileError> {
        let Verified {
            vcode,
            snapshot,
            primary,
            ..
        } = self.verify(id, ctx).await?;

        let receipt = self
            .registry
            .delete_locatie(&vcode, &primary.locatie_id, &snapshot.etag)
            .await?;
        info!("Deleted location {} of {}", primary.locatie_id, vcode);

        if let Err(e) = self.store.delete(ADDRESSES, id, ctx).await {
            error!(
                "Registry location {} of {} deleted but local address {} was not: {}",
                primary.locatie_id, vcode, id, e
            );
            return Err(e.into());
        }

        Ok(receipt)
    }

    /// Steps 1-4: resolve, fetch, select, compare
    async fn verify(&self, id: &str, ctx: &RequestContext) -> Result<Verified, ReconcileError> {
        let vcode =
            resolve_association(self.store.as_ref(), id, RelationshipPath::PrimarySiteAddress, ctx)
                .await?;

        let snapshot = self.registry.get_vereniging(&vcode).await?;

        let primary = select_primary(&snapshot.vereniging.locaties)
            .cloned()
            .ok_or_else(|| ReconcileError::NoPrimaryLocation {
                vcode: vcode.clone(),
            })?;

        let local = self.local_address(id, ctx).await?;
        let report = diff(&local, &primary.address(), &self.mapping);
        if !report.is_clean() {
            match self.policy {
                ConflictPolicy::Block => {
                    warn!("Refusing to write address {}: {}", id, report.summary());
                    return Err(ReconcileError::Conflict {
                        id: id.to_string(),
                        report,
                    });
                },
                ConflictPolicy::LogOnly => {
                    warn!("Address {} drifted from {}: {}", id, vcode, report.summary());
                },
            }
        }

        Ok(Verified {
            vcode,
            snapshot,
            primary,
            report,
        })
    }

    async fn local_address(
        &self,
        id: &str,
        ctx: &RequestContext,
    ) -> Result<AttributeMap, ReconcileError> {
        match self.store.get(ADDRESSES, id, &QueryParams::new(), ctx).await {
            Ok(document) => document
                .single()
                .map(|resource| resource.attributes.clone())
                .ok_or_else(|| ReconcileError::AddressNotFound(id.to_string())),
            Err(e) if e.is_not_found() => Err(ReconcileError::AddressNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
