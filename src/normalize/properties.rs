//! Property flattening
//!
//! Graph properties must be scalars: nested objects are flattened into `.`-joined keys, lists
//! are stored as their JSON text, and `null` becomes an empty string. Booleans and numbers are
//! kept as they are.

use crate::graph::PropertyBag;
use serde_json::Value;

/// Scalar form of a raw value.
pub fn scalar(value: &Value) -> Value {
    match value {
        Value::Null => Value::String(String::new()),
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        other => other.clone(),
    }
}

/// Insert `value` under `key`, flattening objects into `key.<child>` entries.
pub fn flatten_into(bag: &mut PropertyBag, key: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (child, child_value) in map {
                flatten_into(bag, &format!("{}.{}", key, child), child_value);
            }
        }
        other => bag.insert(key, scalar(other)),
    }
}

/// Flatten every top-level field of `raw` except `ignore` into a fresh bag.
///
/// Non-object input yields an empty bag.
pub fn flatten_properties(raw: &Value, ignore: &[&str]) -> PropertyBag {
    let mut bag = PropertyBag::new();
    if let Value::Object(map) = raw {
        for (key, value) in map {
            if ignore.contains(&key.as_str()) {
                continue;
            }
            flatten_into(&mut bag, key, value);
        }
    }
    bag
}
