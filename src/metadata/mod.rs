//! # Metadata Module
//!
//! Metadata trees are nested mappings of arbitrary depth describing the one
//! logical output a conversion produces. Each adapter extracts a best-effort
//! tree from its source headers; the aggregator folds them together with
//! [`deep_merge`] in registration order and applies user overrides last.
//!
//! ## Merge rule
//!
//! For each key of the incoming tree:
//! - absent in the accumulator: inserted;
//! - both sides are mappings: merged recursively;
//! - otherwise: the incoming value replaces the existing one.
//!
//! Later sources therefore win for leaves while nested mappings are unioned.
//! A replacement that changes the value kind (e.g. a mapping overwritten by a
//! string) is logged at `warn` level but still applied.
//!
//! ```rust
//! use confluence::metadata::{aggregate_metadata, MetadataTree};
//! use serde_json::json;
//!
//! let a = MetadataTree::from_value(json!({"File": {"lab": "A", "institution": "X"}}))?;
//! let b = MetadataTree::from_value(json!({"File": {"lab": "B"}}))?;
//! let merged = aggregate_metadata([("first", &a), ("second", &b)], None);
//!
//! assert_eq!(merged.get_path("File.lab"), Some(&json!("B")));
//! assert_eq!(merged.get_path("File.institution"), Some(&json!("X")));
//! # Ok::<(), confluence::metadata::MetadataError>(())
//! ```

mod defaults;
mod error;

#[cfg(test)]
mod tests;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::validation::value_kind;

pub use defaults::{
    base_metadata_schema, default_root_metadata, DEFAULT_SESSION_DESCRIPTION, ROOT_METADATA_KEY,
};
pub use error::MetadataError;

/// A nested metadata mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataTree(Map<String, Value>);

impl MetadataTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, MetadataError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(MetadataError::NotAnObject(value_kind(&other))),
        }
    }

    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, MetadataError> {
        Self::from_value(serde_json::from_str(json)?)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, MetadataError> {
        let table: toml::Table = toml::from_str(text)?;
        Ok(Self(toml_table_to_json(table)))
    }

    /// Load a `.json` or `.toml` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MetadataError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            other => Err(MetadataError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    /// Borrow the underlying mapping.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Mutably borrow the underlying mapping.
    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Unwrap into the underlying mapping.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Convert into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Returns true if the tree has no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Top-level value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Nested value at a dotted path (`"File.identifier"`).
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = self.0.get(segments.next()?)?;
        segments.try_fold(first, |node, segment| node.as_object()?.get(segment))
    }

    /// Set the value at a dotted path, creating intermediate mappings.
    ///
    /// Intermediate non-mapping values are replaced.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(last) = segments.pop() else {
            return;
        };
        let mut node = &mut self.0;
        for segment in segments {
            let entry = node
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(map) = entry else {
                return;
            };
            node = map;
        }
        node.insert(last.to_string(), value.into());
    }

    /// Deep-merge `other` on top of this tree.
    pub fn merge(&mut self, other: &MetadataTree, label: &str) {
        deep_merge(&mut self.0, &other.0, label);
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, MetadataError> {
        Ok(serde_json::to_string_pretty(&self.0)?)
    }
}

impl From<Map<String, Value>> for MetadataTree {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Deep-merge `source` into `target`; `label` names the source in diagnostics.
pub fn deep_merge(target: &mut Map<String, Value>, source: &Map<String, Value>, label: &str) {
    let mut path = Vec::new();
    merge_at(target, source, label, &mut path);
}

fn merge_at<'a>(
    target: &mut Map<String, Value>,
    source: &'a Map<String, Value>,
    label: &str,
    path: &mut Vec<&'a str>,
) {
    for (key, incoming) in source {
        path.push(key);
        if let Some(existing) = target.get_mut(key) {
            match (existing, incoming) {
                (Value::Object(existing), Value::Object(nested)) => {
                    merge_at(existing, nested, label, path)
                }
                (existing, incoming) => {
                    let (old, new) = (value_kind(existing), value_kind(incoming));
                    if old != new {
                        log::warn!(
                            "metadata '{}' from '{}' replaces a {} with a {}",
                            path.join("."),
                            label,
                            old,
                            new
                        );
                    }
                    *existing = incoming.clone();
                }
            }
        } else {
            target.insert(key.clone(), incoming.clone());
        }
        path.pop();
    }
}

/// Merge labeled metadata trees in order, then apply `overrides` on top.
///
/// Starts from an empty tree and never fails.
pub fn aggregate_metadata<'a, I>(sources: I, overrides: Option<&MetadataTree>) -> MetadataTree
where
    I: IntoIterator<Item = (&'a str, &'a MetadataTree)>,
{
    let mut merged = MetadataTree::new();
    for (label, tree) in sources {
        merged.merge(tree, label);
    }
    if let Some(overrides) = overrides {
        merged.merge(overrides, "user overrides");
    }
    merged
}

/// Convert a parsed TOML table into a JSON mapping.
///
/// Datetimes become RFC 3339 strings.
pub fn toml_table_to_json(table: toml::Table) -> Map<String, Value> {
    table
        .into_iter()
        .map(|(key, value)| (key, toml_to_json(value)))
        .collect()
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(toml_table_to_json(table)),
    }
}
