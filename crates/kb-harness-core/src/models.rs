//! Core data models that flow through ingestion and retrieval.
//!
//! Documents arrive from an external connector as JSON objects
//! `{id, content, metadata}`. Long documents are split into chunks, which
//! are themselves [`Document`]s carrying extra metadata. Every document
//! becomes one [`VectorRecord`] inside a named collection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HarnessError, Result};

/// Flat metadata mapping. Values must be scalars (string, number, bool).
pub type Metadata = serde_json::Map<String, Value>;

/// A source document or a chunk derived from one.
///
/// `content` is optional so that non-text artifacts can pass through the
/// chunker untouched; anything written to a collection must carry text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: Some(content.into()),
            metadata: Metadata::new(),
        }
    }

    /// Builder-style metadata insertion.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

/// A record as stored in a collection: text, metadata and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// One hit from a similarity search.
///
/// `distance` is the cosine distance `1 - cos(θ)`, clamped at zero;
/// result lists are ordered ascending (most similar first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub distance: f32,
}

/// Introspection view of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub count: usize,
    pub metadata: Metadata,
}

/// Reject metadata values that are not scalars.
pub fn validate_metadata(owner: &str, metadata: &Metadata) -> Result<()> {
    for (key, value) in metadata {
        if key.is_empty() {
            return Err(HarnessError::validation(format!(
                "{}: metadata keys must be non-empty",
                owner
            )));
        }
        if !is_scalar(value) {
            return Err(HarnessError::validation(format!(
                "{}: metadata '{}' must be a string, number or bool",
                owner, key
            )));
        }
    }
    Ok(())
}

pub(crate) fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// Validate a connector batch and convert it into [`Document`]s.
///
/// Every element must be an object with a non-empty string `id`, a
/// non-empty string `content`, and an optional `metadata` object of
/// scalar values. Ids must be unique within the batch. The first
/// violation rejects the whole batch.
pub fn parse_documents(values: &[Value]) -> Result<Vec<Document>> {
    let mut seen = std::collections::HashSet::new();
    let mut docs = Vec::with_capacity(values.len());

    for (i, value) in values.iter().enumerate() {
        let obj = value.as_object().ok_or_else(|| {
            HarnessError::validation(format!("document {} is not a JSON object", i))
        })?;

        let id = match obj.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(_) => {
                return Err(HarnessError::validation(format!(
                    "document {}: 'id' must be a non-empty string",
                    i
                )))
            }
            None => {
                return Err(HarnessError::validation(format!(
                    "document {} missing required field: id",
                    i
                )))
            }
        };

        let content = match obj.get("content") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(_) => {
                return Err(HarnessError::validation(format!(
                    "document {} ('{}'): 'content' must be a non-empty string",
                    i, id
                )))
            }
            None => {
                return Err(HarnessError::validation(format!(
                    "document {} ('{}') missing required field: content",
                    i, id
                )))
            }
        };

        let metadata = match obj.get("metadata") {
            None | Some(Value::Null) => Metadata::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(HarnessError::validation(format!(
                    "document {} ('{}'): 'metadata' must be an object",
                    i, id
                )))
            }
        };
        validate_metadata(&format!("document {} ('{}')", i, id), &metadata)?;

        if !seen.insert(id.clone()) {
            return Err(HarnessError::validation(format!(
                "document {}: duplicate id '{}'",
                i, id
            )));
        }

        docs.push(Document {
            id,
            content: Some(content),
            metadata,
        });
    }

    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_valid_batch() {
        let values = vec![
            json!({"id": "p1", "content": "Order processor", "metadata": {"title": "Orders", "page": 3}}),
            json!({"id": "p2", "content": "User profile"}),
        ];
        let docs = parse_documents(&values).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].metadata["title"], "Orders");
        assert!(docs[1].metadata.is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_content() {
        let values = vec![
            json!({"id": "p1", "content": "fine"}),
            json!({"id": "p2"}),
        ];
        let err = parse_documents(&values).unwrap_err();
        assert!(matches!(err, HarnessError::Validation(_)));
        assert!(err.to_string().contains("document 1"));
    }

    #[test]
    fn test_parse_rejects_blank_id() {
        let values = vec![json!({"id": "  ", "content": "text"})];
        assert!(matches!(
            parse_documents(&values),
            Err(HarnessError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_string_content() {
        let values = vec![json!({"id": "a", "content": 42})];
        assert!(parse_documents(&values).is_err());
    }

    #[test]
    fn test_parse_rejects_nested_metadata() {
        let values = vec![json!({"id": "a", "content": "x", "metadata": {"tags": ["a", "b"]}})];
        let err = parse_documents(&values).unwrap_err();
        assert!(err.to_string().contains("tags"));
    }

    #[test]
    fn test_parse_rejects_duplicate_ids() {
        let values = vec![
            json!({"id": "a", "content": "x"}),
            json!({"id": "a", "content": "y"}),
        ];
        let err = parse_documents(&values).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_document_serde_skips_missing_content() {
        let doc = Document {
            id: "img".into(),
            content: None,
            metadata: Metadata::new(),
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("content").is_none());
    }
}
