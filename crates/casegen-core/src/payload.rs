//! Lenient field access for model payloads
//!
//! Model output is normalized into canonical types at one boundary; these
//! helpers read whatever shape arrived (aliases, scalar-or-list) without
//! failing the whole payload on one odd field.

use serde_json::Value;

/// First non-empty string (or number) under any of `keys`
#[must_use]
pub fn str_field(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// String list under the first present key; a scalar becomes one item
#[must_use]
pub fn list_field(obj: &Value, keys: &[&str]) -> Vec<String> {
    let Some(value) = keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null())) else {
        return Vec::new();
    };
    let items: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    };
    items.into_iter().filter(|s| !s.is_empty()).collect()
}

/// Index list under the first present key; strings holding numbers are accepted
#[must_use]
pub fn index_field(obj: &Value, keys: &[&str]) -> Vec<usize> {
    let Some(value) = keys.iter().find_map(|k| obj.get(*k)) else {
        return Vec::new();
    };
    let as_index = |v: &Value| match v {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    match value {
        Value::Array(items) => items.iter().filter_map(as_index).collect(),
        other => as_index(other).into_iter().collect(),
    }
}

/// The value itself when it is an array, else the first array under `keys`
#[must_use]
pub fn array_at<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    if let Value::Array(items) = value {
        return Some(items);
    }
    keys.iter().find_map(|k| value.get(*k)?.as_array())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(obj) => str_field(value, &["text", "description", "step", "value"])
            .or_else(|| (!obj.is_empty()).then(|| value.to_string())),
        _ => None,
    }
}
