//! Read-only view of the value stored at a path at one point in time.

use serde_json::Value;

use crate::path::StorePath;

/// The value found at `path` when a read or notification was produced.
///
/// A missing value is represented as `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    path: StorePath,
    value: Value,
}

impl Snapshot {
    pub fn new(path: StorePath, value: Value) -> Self {
        Self { path, value }
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Last segment of the path (the child key for collection items).
    pub fn key(&self) -> &str {
        self.path.key().unwrap_or("")
    }

    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Snapshot of a direct child. Arrays are addressed by index.
    pub fn child(&self, key: &str) -> Snapshot {
        let value = match &self.value {
            Value::Object(map) => map.get(key).cloned(),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
            _ => None,
        };
        Snapshot::new(self.path.child(key), value.unwrap_or(Value::Null))
    }

    /// Non-null direct children, in key order for objects and index order
    /// for arrays.
    pub fn children(&self) -> Vec<Snapshot> {
        match &self.value {
            Value::Object(map) => map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| Snapshot::new(self.path.child(k.as_str()), v.clone()))
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_null())
                .map(|(i, v)| Snapshot::new(self.path.child(i.to_string()), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// Integer value; floats are truncated, numeric strings are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match &self.value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.value.as_bool()
    }

    /// Non-empty string stored under `key`.
    pub fn child_str(&self, key: &str) -> Option<String> {
        match &self.value {
            Value::Object(map) => map
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            _ => None,
        }
    }
}
