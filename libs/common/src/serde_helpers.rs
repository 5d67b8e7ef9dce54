//! Shared Serde deserializers
//!
//! Upstream registries are not consistent about identifier types. These
//! helpers accept the variants seen in practice:
//! - Native number `123` → "123"
//! - String `"123"` → "123"

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Int(i64),
    Float(f64),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Int(i) => i.to_string(),
            StringOrNumber::Float(f) => f.to_string(),
        }
    }
}

/// Deserialize an identifier sent either as a JSON string or a JSON number
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer).map(String::from)
}

/// Optional variant of [`string_or_number`]; `null` maps to `None`
pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<StringOrNumber>::deserialize(deserializer).map(|v| v.map(String::from))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(deserialize_with = "string_or_number")]
        id: String,
        #[serde(default, deserialize_with = "opt_string_or_number")]
        parent: Option<String>,
    }

    #[test]
    fn test_accepts_number_and_string() {
        let a: Holder = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(a.id, "7");
        assert_eq!(a.parent, None);

        let b: Holder = serde_json::from_str(r#"{"id": "7", "parent": 3}"#).unwrap();
        assert_eq!(b.id, "7");
        assert_eq!(b.parent.as_deref(), Some("3"));

        let c: Holder = serde_json::from_str(r#"{"id": "x", "parent": null}"#).unwrap();
        assert_eq!(c.parent, None);
    }

    #[test]
    fn test_rejects_other_types() {
        assert!(serde_json::from_str::<Holder>(r#"{"id": true}"#).is_err());
    }
}
