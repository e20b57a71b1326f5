use serde_json::{Map, Value};

/// A schemaless record: field name to JSON scalar value. Documents carry
/// their own key under the `id` field once stored.
pub type Document = Map<String, Value>;

/// Unwrap a `serde_json::json!` object literal into a document. A
/// non-object value yields an empty document.
pub fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Read a string field from a document.
pub fn get_str<'a>(doc: &'a Document, key: &str) -> Option<&'a str> {
    doc.get(key).and_then(Value::as_str)
}

/// Read an integer field from a document. Accepts any JSON number that
/// fits in i64, since documents round-tripped through serde may carry
/// floats where integers were written.
pub fn get_i64(doc: &Document, key: &str) -> Option<i64> {
    match doc.get(key) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}

/// Read a boolean field from a document.
pub fn get_bool(doc: &Document, key: &str) -> Option<bool> {
    doc.get(key).and_then(Value::as_bool)
}
