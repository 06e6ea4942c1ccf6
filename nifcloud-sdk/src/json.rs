//! Navigation helpers for decoded responses
//!
//! Paths are dot separated element names (`reservationSet.instancesSet`).
//! A single repeated element decodes to an object rather than an array, so
//! list lookups accept both shapes.

use serde_json::Value;

/// Value at a dotted path
pub fn at<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |v, key| v.get(key))
}

/// Items of the list at `path`; absent or null yields no items
pub fn list_at<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    as_list(at(value, path))
}

/// Items of an optional list value
pub fn as_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    }
}

/// Non-empty string at `path`
pub fn str_at<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    at(value, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

pub fn string_at(value: &Value, path: &str) -> Option<String> {
    str_at(value, path).map(str::to_string)
}

/// Integer at `path`, accepting the string form used by XML responses
pub fn int_at(value: &Value, path: &str) -> Option<i64> {
    match at(value, path)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Boolean at `path`, accepting the string form used by XML responses
pub fn bool_at(value: &Value, path: &str) -> Option<bool> {
    match at(value, path)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" | "True" | "TRUE" => Some(true),
            "false" | "False" | "FALSE" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Non-empty strings at `field` within each item of the list at `path`
pub fn strings_at(value: &Value, path: &str, field: &str) -> Vec<String> {
    list_at(value, path)
        .into_iter()
        .filter_map(|item| string_at(item, field))
        .collect()
}
