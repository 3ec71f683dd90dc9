use serde_json::{Map, Value};

/// Shape of one node in the parser's result tree, decided once before traversal.
///
/// Precedence is fixed: an object carrying `value` or `text` is a `FieldWrapper`
/// even when it also has nested keys, so it is never recursed into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind<'a> {
    FieldWrapper(&'a Map<String, Value>),
    Structural(&'a Map<String, Value>),
    List(&'a [Value]),
    Primitive(&'a Value),
}

pub fn classify(node: &Value) -> NodeKind<'_> {
    match node {
        Value::Object(map) if is_field_wrapper(map) => NodeKind::FieldWrapper(map),
        Value::Object(map) => NodeKind::Structural(map),
        Value::Array(items) => NodeKind::List(items),
        other => NodeKind::Primitive(other),
    }
}

fn is_field_wrapper(map: &Map<String, Value>) -> bool {
    map.contains_key("value") || map.contains_key("text")
}
