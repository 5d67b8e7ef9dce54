//! Local/remote address drift detection

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::mapping::{AttributeMap, FieldMapping};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Match,
    Mismatch { local: Value, remote: Value },
    /// Missing (or `null`) on at least one side
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldComparison {
    pub local_key: String,
    pub remote_key: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Per-field result of comparing a local address with the registry's
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConflictReport {
    pub fields: Vec<FieldComparison>,
}

impl ConflictReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches().next().is_none()
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &FieldComparison> {
        self.fields
            .iter()
            .filter(|f| matches!(f.outcome, Outcome::Mismatch { .. }))
    }

    /// `number (12 != 10), street (..)`
    pub fn summary(&self) -> String {
        self.mismatches()
            .map(|f| match &f.outcome {
                Outcome::Mismatch { local, remote } => {
                    format!("{} ({} != {})", f.local_key, local, remote)
                },
                _ => f.local_key.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn present<'a>(map: &'a AttributeMap, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

/// Compare every mapped field; values must be strictly equal
pub fn diff(local: &AttributeMap, remote: &AttributeMap, mapping: &FieldMapping) -> ConflictReport {
    let fields = mapping
        .mapped()
        .map(|(local_key, remote_key)| {
            let outcome = match (present(local, local_key), present(remote, remote_key)) {
                (Some(l), Some(r)) if l == r => {
                    debug!("Field {}/{} matches: {}", local_key, remote_key, l);
                    Outcome::Match
                },
                (Some(l), Some(r)) => {
                    warn!(
                        "Field {}/{} differs: local {} remote {}",
                        local_key, remote_key, l, r
                    );
                    Outcome::Mismatch {
                        local: l.clone(),
                        remote: r.clone(),
                    }
                },
                _ => Outcome::Skipped,
            };
            FieldComparison {
                local_key: local_key.to_string(),
                remote_key: remote_key.to_string(),
                outcome,
            }
        })
        .collect();

    ConflictReport { fields }
}

/// `true` when no mapped field present on both sides differs
pub fn compare(local: &AttributeMap, remote: &AttributeMap, mapping: &FieldMapping) -> bool {
    diff(local, remote, mapping).is_clean()
}
