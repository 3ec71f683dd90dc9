//! Flattens an arbitrarily nested parser result into a `RecordSet`.
//!
//! Traversal per key/value pair, with `path = prefix.key`:
//! 1. field wrapper (`value`/`text` present) → one leaf, confidence from `confidence`/`score`
//! 2. other object → recurse with `path` as the new prefix
//! 3. scalar, null or bare list → one leaf at the default confidence
//!
//! No schema is assumed. The list join is lossy on purpose.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::normalize::classify::{classify, NodeKind};
use crate::normalize::record::{AnnotatedField, RecordSet, DEFAULT_CONFIDENCE};

const LIST_SEPARATOR: &str = ", ";

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("parser result must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Entry point for a decoded response body. Only an object root can be flattened.
pub fn normalize_document(body: &Value) -> Result<RecordSet, NormalizeError> {
    match body {
        Value::Object(map) => Ok(normalize(map, "")),
        other => Err(NormalizeError::NotAnObject(json_kind(other))),
    }
}

pub fn normalize(tree: &Map<String, Value>, prefix: &str) -> RecordSet {
    let mut records = RecordSet::new();

    for (key, node) in tree {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match classify(node) {
            NodeKind::FieldWrapper(wrapper) => records.insert(extract_field(path, wrapper)),
            NodeKind::Structural(child) => records.merge(normalize(child, &path)),
            NodeKind::List(items) => {
                records.insert(AnnotatedField::new(path, join_list(items), DEFAULT_CONFIDENCE))
            }
            NodeKind::Primitive(value) => records.insert(AnnotatedField::new(
                path,
                render_scalar(value),
                DEFAULT_CONFIDENCE,
            )),
        }
    }

    records
}

fn extract_field(path: String, wrapper: &Map<String, Value>) -> AnnotatedField {
    let raw = wrapper
        .get("value")
        .filter(|v| !v.is_null())
        .or_else(|| wrapper.get("text"))
        .unwrap_or(&Value::Null);

    let value = match raw {
        Value::Array(items) => join_list(items),
        other => render_scalar(other),
    };

    let confidence = ["confidence", "score"]
        .iter()
        .find_map(|key| wrapper.get(*key).and_then(Value::as_f64))
        .unwrap_or(DEFAULT_CONFIDENCE);

    AnnotatedField::new(path, value, confidence)
}

fn join_list(items: &[Value]) -> String {
    items
        .iter()
        .map(render_scalar)
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
