//! Combining per-adapter schemas into one contract.
//!
//! Source and options schemas are *namespaced*: each adapter label becomes a
//! top-level property holding that adapter's schema unchanged. Metadata
//! schemas are *merged*, because all adapters describe the same logical
//! output file.

use serde_json::Value;

use super::{ObjectSchema, Schema};
use crate::metadata::MetadataTree;

/// Schema-dialect identifier stamped on composed root schemas.
pub const SCHEMA_DIALECT: &str = "http://json-schema.org/draft-07/schema#";

/// Passthrough bookkeeping for a composed top-level schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootInfo {
    /// `$id`
    pub id: String,
    /// `title`
    pub title: String,
    /// `description`
    pub description: String,
    /// `version`
    pub version: String,
}

impl RootInfo {
    /// Bookkeeping for the composed source schema.
    pub fn source() -> Self {
        Self::new(
            "source.schema.json",
            "Source data schema",
            "Schema for the source data, files and directories",
        )
    }

    /// Bookkeeping for the composed metadata schema.
    pub fn metadata() -> Self {
        Self::new("metadata.schema.json", "Metadata", "Schema for the metadata")
    }

    /// Bookkeeping for the composed run options schema.
    pub fn options() -> Self {
        Self::new(
            "conversion_options.schema.json",
            "Conversion options schema",
            "Schema for the conversion options",
        )
    }

    fn new(id: &str, title: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            version: "0.1.0".to_string(),
        }
    }

    /// An empty object schema carrying this bookkeeping.
    pub fn root_schema(&self) -> ObjectSchema {
        let mut root = ObjectSchema::new();
        root.dialect = Some(SCHEMA_DIALECT.to_string());
        root.id = Some(self.id.clone());
        root.version = Some(self.version.clone());
        root.annotations.title = Some(self.title.clone());
        root.annotations.description = Some(self.description.clone());
        root
    }
}

/// Build a closed root schema whose properties are exactly the given labels.
///
/// `required` stays empty: requiredness of each adapter's own fields is
/// enforced inside that label's subtree.
pub fn compose_namespaced<'a, I>(info: &RootInfo, labeled: I) -> Schema
where
    I: IntoIterator<Item = (&'a str, Schema)>,
{
    let mut root = info.root_schema();
    root.additional_properties = false;
    for (label, schema) in labeled {
        root.properties.insert(label.to_string(), schema);
    }
    Schema::Object(root)
}

/// Compose the source schema of a list of labeled adapter source schemas.
pub fn compose_source_schema<'a, I>(labeled: I) -> Schema
where
    I: IntoIterator<Item = (&'a str, Schema)>,
{
    compose_namespaced(&RootInfo::source(), labeled)
}

/// Compose the run options schema of a list of labeled adapter options schemas.
pub fn compose_options_schema<'a, I>(labeled: I) -> Schema
where
    I: IntoIterator<Item = (&'a str, Schema)>,
{
    compose_namespaced(&RootInfo::options(), labeled)
}

/// Deep-merge `overlay` into `base`.
///
/// When both nodes are objects, properties are unioned recursively (new keys
/// appended in overlay order), `required` lists are unioned, and the overlay's
/// `additionalProperties` and annotations win. Any other pairing replaces
/// `base` with `overlay`. Root bookkeeping of `base` is kept.
pub fn merge_schema(base: &mut Schema, overlay: Schema) {
    match (base, overlay) {
        (Schema::Object(base), Schema::Object(overlay)) => {
            for (name, child) in overlay.properties {
                match base.properties.get_mut(&name) {
                    Some(existing) => merge_schema(existing, child),
                    None => {
                        base.properties.insert(name, child);
                    }
                }
            }
            for name in overlay.required {
                if !base.required.contains(&name) {
                    base.required.push(name);
                }
            }
            base.additional_properties = overlay.additional_properties;
            base.annotations.overlay(overlay.annotations);
        }
        (base, overlay) => *base = overlay,
    }
}

/// Merge labeled adapter metadata schemas into `base`, in order.
pub fn compose_metadata_schema<'a, I>(base: Schema, labeled: I) -> Schema
where
    I: IntoIterator<Item = (&'a str, Schema)>,
{
    let mut composed = base;
    for (label, mut schema) in labeled {
        log::trace!("merging metadata schema of '{}'", label);
        if let Some(object) = schema.as_object_mut() {
            object.unroot();
        }
        merge_schema(&mut composed, schema);
    }
    composed
}

/// Record aggregated metadata values as `default` on matching leaf schemas.
pub fn fill_defaults(schema: &mut Schema, metadata: &MetadataTree) {
    if let Some(object) = schema.as_object_mut() {
        fill_object_defaults(object, metadata.as_map());
    }
}

fn fill_object_defaults(object: &mut ObjectSchema, values: &serde_json::Map<String, Value>) {
    for (name, child) in object.properties.iter_mut() {
        let Some(value) = values.get(name) else {
            continue;
        };
        match (child, value) {
            (Schema::Object(child), Value::Object(nested)) => fill_object_defaults(child, nested),
            (Schema::Object(_), _) => {}
            (leaf, value) => leaf.annotations_mut().default = Some(value.clone()),
        }
    }
}
