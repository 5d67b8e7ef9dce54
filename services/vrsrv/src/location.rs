//! Registry association model and primary-location selection

use common::serde_helpers::string_or_number;
use serde::{Deserialize, Serialize};

use crate::mapping::AttributeMap;

/// `locatietype` of the seat registered in the KBO
pub const KBO_SEAT: &str = "Maatschappelijke zetel volgens KBO";
/// `locatietype` of a correspondence address
pub const CORRESPONDENCE: &str = "Correspondentie";

/// One `locaties[]` entry of a vereniging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(deserialize_with = "string_or_number")]
    pub locatie_id: String,
    #[serde(default)]
    pub is_primair: bool,
    #[serde(default)]
    pub locatietype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naam: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bron: Option<String>,
    #[serde(default)]
    pub adres: Option<AttributeMap>,
}

impl Location {
    pub fn is_kbo_seat(&self) -> bool {
        self.locatietype == KBO_SEAT
    }

    /// Address attributes in registry naming; empty when the location has none
    pub fn address(&self) -> AttributeMap {
        self.adres.clone().unwrap_or_default()
    }
}

/// The parts of a registry vereniging the adapter reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vereniging {
    pub v_code: String,
    #[serde(default)]
    pub naam: Option<String>,
    #[serde(default)]
    pub locaties: Vec<Location>,
}

/// Registry GET responses wrap the association in a `vereniging` member
#[derive(Debug, Deserialize)]
pub(crate) struct VerenigingEnvelope {
    pub vereniging: Vereniging,
}

/// Pick the canonical location of an association.
///
/// Rules are tried in order and each scans the whole list, so a later
/// `isPrimair` entry beats an earlier KBO seat. The order matches the
/// harvester consuming the registry and must not change.
pub fn select_primary(locations: &[Location]) -> Option<&Location> {
    locations
        .iter()
        .find(|l| l.is_primair)
        .or_else(|| locations.iter().find(|l| l.locatietype == KBO_SEAT))
        .or_else(|| locations.iter().find(|l| l.locatietype == CORRESPONDENCE))
        .or_else(|| locations.first())
}
