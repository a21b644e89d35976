//! Metadata equality filters for similarity search.
//!
//! A [`MetadataFilter`] is a conjunction of `key == value` constraints.
//! A record matches when every constrained key is present in its metadata
//! with an equal value. Numbers compare by value, so `3` matches `3.0`.
//! Values parsed from `key=value` text also match string metadata spelled
//! the same way, so `version=2.7` finds `{"version": "2.7"}`.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{HarnessError, Result};
use crate::models::{is_scalar, Metadata};

/// AND-combined metadata equality constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, Value>,
    /// Original text of conditions that came from `parse_pairs`.
    raw: BTreeMap<String, String>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `key == value` constraint.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        self.raw.remove(&key);
        self.conditions.insert(key, value.into());
        self
    }

    /// Build a filter from a JSON object, validating every constraint.
    pub fn from_map(map: &Metadata) -> Result<Self> {
        let filter = Self {
            conditions: map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            raw: BTreeMap::new(),
        };
        filter.validate()?;
        Ok(filter)
    }

    /// Parse CLI-style `key=value` pairs.
    ///
    /// Values are interpreted as an integer, then a float, then a bool, and
    /// fall back to a plain string.
    pub fn parse_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<Self> {
        let mut filter = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, raw) = pair.split_once('=').ok_or_else(|| {
                HarnessError::validation(format!("filter '{}' must look like key=value", pair))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(HarnessError::validation(format!(
                    "filter '{}' has an empty key",
                    pair
                )));
            }
            let raw = raw.trim();
            filter.conditions.insert(key.to_string(), parse_scalar(raw));
            filter.raw.insert(key.to_string(), raw.to_string());
        }
        Ok(filter)
    }

    /// Reject empty keys and non-scalar values.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in &self.conditions {
            if key.trim().is_empty() {
                return Err(HarnessError::validation("filter keys must be non-empty"));
            }
            if !is_scalar(value) {
                return Err(HarnessError::validation(format!(
                    "filter value for '{}' must be a string, number or bool",
                    key
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// True when `metadata` satisfies every constraint.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(key, expected)| match metadata.get(key) {
                Some(actual) => {
                    values_equal(actual, expected)
                        || matches!((actual, self.raw.get(key)), (Value::String(a), Some(r)) if a == r)
                }
                None => false,
            })
    }
}

fn parse_scalar(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(v: Value) -> Metadata {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let f = MetadataFilter::new();
        assert!(f.is_empty());
        assert!(f.matches(&Metadata::new()));
    }

    #[test]
    fn test_and_semantics() {
        let f = MetadataFilter::new()
            .with("category", "ops")
            .with("team", "payments");
        assert!(f.matches(&meta(json!({"category": "ops", "team": "payments", "x": 1}))));
        assert!(!f.matches(&meta(json!({"category": "ops", "team": "users"}))));
        assert!(!f.matches(&meta(json!({"category": "ops"}))));
    }

    #[test]
    fn test_numeric_equality_ignores_representation() {
        let f = MetadataFilter::new().with("page", 3);
        assert!(f.matches(&meta(json!({"page": 3.0}))));
        assert!(!f.matches(&meta(json!({"page": "3"}))));
    }

    #[test]
    fn test_parse_pairs_types() {
        let f = MetadataFilter::parse_pairs(&["page=3", "score=0.5", "live=true", "space=DEV"])
            .unwrap();
        assert!(f.matches(&meta(json!({
            "page": 3, "score": 0.5, "live": true, "space": "DEV"
        }))));
    }

    #[test]
    fn test_parse_pairs_matches_string_metadata() {
        let f = MetadataFilter::parse_pairs(&["version=2.7"]).unwrap();
        assert!(f.matches(&meta(json!({"version": "2.7"}))));
        assert!(f.matches(&meta(json!({"version": 2.7}))));
        assert!(!f.matches(&meta(json!({"version": "2.70"}))));

        let f = MetadataFilter::parse_pairs(&["id=007", "live=true"]).unwrap();
        assert!(f.matches(&meta(json!({"id": "007", "live": "true"}))));
        assert!(f.matches(&meta(json!({"id": 7, "live": true}))));
        assert!(!f.matches(&meta(json!({"id": "7", "live": true}))));
    }

    #[test]
    fn test_with_replaces_parsed_text() {
        let f = MetadataFilter::parse_pairs(&["page=3"]).unwrap().with("page", 3);
        assert!(!f.matches(&meta(json!({"page": "3"}))));
    }

    #[test]
    fn test_parse_pairs_rejects_malformed() {
        assert!(MetadataFilter::parse_pairs(&["nokey"]).is_err());
        assert!(MetadataFilter::parse_pairs(&["=value"]).is_err());
    }

    #[test]
    fn test_from_map_rejects_nested() {
        let err = MetadataFilter::from_map(&meta(json!({"tags": ["a"]}))).unwrap_err();
        assert!(matches!(err, HarnessError::Validation(_)));
    }
}
