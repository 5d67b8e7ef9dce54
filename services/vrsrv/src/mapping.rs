//! Attribute-name mapping between the local address schema and the registry's
//! `adres` schema.

use serde_json::{Map, Value};

/// Attribute bag keyed by field name, as found in JSON:API `attributes` or
/// the registry's `adres` object
pub type AttributeMap = Map<String, Value>;

/// Local address keys and their registry counterparts.
///
/// `full-address` has no registry field; the registry derives its own
/// `adresvoorstelling`.
const ADDRESS_FIELDS: &[(&str, Option<&str>)] = &[
    ("number", Some("huisnummer")),
    ("box-number", Some("busnummer")),
    ("street", Some("straatnaam")),
    ("postcode", Some("postcode")),
    ("municipality", Some("gemeente")),
    ("province", Some("provincie")),
    ("country", Some("land")),
    ("full-address", None),
];

/// One row of a [`FieldMapping`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPair {
    pub source: String,
    /// `None` marks a known field that is never copied or compared
    pub target: Option<String>,
}

/// Ordered source-key → target-key table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pairs: Vec<FieldPair>,
}

impl FieldMapping {
    pub fn new<I, S, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<T>)>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(source, target)| FieldPair {
                    source: source.into(),
                    target: target.map(Into::into),
                })
                .collect(),
        }
    }

    /// Local address → registry `adres`
    pub fn address() -> Self {
        Self::new(ADDRESS_FIELDS.iter().copied())
    }

    /// Pairs that have a target key
    pub fn mapped(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs
            .iter()
            .filter_map(|p| p.target.as_deref().map(|t| (p.source.as_str(), t)))
    }

    /// All pairs, including unmapped ones
    pub fn pairs(&self) -> &[FieldPair] {
        &self.pairs
    }

    /// Target key for a source key, if the field is mapped
    pub fn target_of(&self, source: &str) -> Option<&str> {
        self.mapped().find(|(s, _)| *s == source).map(|(_, t)| t)
    }

    /// Reverse direction; unmapped rows are dropped
    pub fn inverse(&self) -> Self {
        Self::new(self.mapped().map(|(s, t)| (t.to_string(), Some(s.to_string()))))
    }
}

/// Copy every mapped field present in `source` to its target key.
///
/// Absent and `null` source values are left out of the result.
pub fn map_values(source: &AttributeMap, mapping: &FieldMapping) -> AttributeMap {
    mapping
        .mapped()
        .filter_map(|(from, to)| match source.get(from) {
            Some(Value::Null) | None => None,
            Some(value) => Some((to.to_string(), value.clone())),
        })
        .collect()
}
