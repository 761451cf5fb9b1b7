//! # Schema Module
//!
//! A small typed schema AST covering the subset of JSON Schema that adapters
//! exchange: `object`, `array`, `string`, `number` and `boolean` nodes.
//!
//! Every adapter describes three structural contracts with it (source
//! locations, metadata, run options). The [`compose`] submodule merges those
//! contracts across adapters and [`validation`] checks candidate input trees
//! against the result.
//!
//! ## Wire representation
//!
//! ```json
//! {
//!   "type": "object",
//!   "properties": {
//!     "file_path": { "type": "string", "format": "file" }
//!   },
//!   "required": ["file_path"],
//!   "additionalProperties": false
//! }
//! ```
//!
//! ## Building schemas
//!
//! ```rust
//! use confluence::schema::{ObjectSchema, Schema};
//!
//! let schema: Schema = ObjectSchema::new()
//!     .required("file_path", Schema::string().with_format("file"))
//!     .optional("verbose", Schema::boolean())
//!     .closed()
//!     .into();
//!
//! assert_eq!(schema.as_object().unwrap().required, vec!["file_path"]);
//! ```

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod compose;
mod error;
pub mod validation;


pub use compose::{
    compose_metadata_schema, compose_options_schema, compose_source_schema, fill_defaults,
    merge_schema, RootInfo, SCHEMA_DIALECT,
};
pub use error::SchemaError;
pub use validation::{validate, SchemaViolation, ViolationRule};

/// The kind of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    /// Nested mapping with named properties
    Object,
    /// Ordered sequence
    Array,
    /// UTF-8 string
    String,
    /// Integer or floating-point number
    Number,
    /// `true` / `false`
    Boolean,
}

impl SchemaKind {
    /// Wire name of this kind (the value of the `type` key).
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Object => "object",
            SchemaKind::Array => "array",
            SchemaKind::String => "string",
            SchemaKind::Number => "number",
            SchemaKind::Boolean => "boolean",
        }
    }

    /// Returns true if `value` is an instance of this kind.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            SchemaKind::Object => value.is_object(),
            SchemaKind::Array => value.is_array(),
            SchemaKind::String => value.is_string(),
            SchemaKind::Number => value.is_number(),
            SchemaKind::Boolean => value.is_boolean(),
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annotations shared by every node kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    /// Free-form hint such as `"file"`, `"directory"` or `"date-time"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Default value offered to callers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Short title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Closed set of accepted values
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,

    /// Inclusive lower bound for numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    /// Inclusive upper bound for numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl Annotations {
    /// Overlay `other` on top of `self`; fields present in `other` win.
    pub(crate) fn overlay(&mut self, other: Annotations) {
        if other.format.is_some() {
            self.format = other.format;
        }
        if other.default.is_some() {
            self.default = other.default;
        }
        if other.description.is_some() {
            self.description = other.description;
        }
        if other.title.is_some() {
            self.title = other.title;
        }
        if other.allowed.is_some() {
            self.allowed = other.allowed;
        }
        if other.minimum.is_some() {
            self.minimum = other.minimum;
        }
        if other.maximum.is_some() {
            self.maximum = other.maximum;
        }
    }
}

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// Object node: an ordered mapping of property names to child schemas.
///
/// Invariant: every name in `required` is a key of `properties`. The builder
/// methods keep it by construction; [`Schema::check`] verifies it for schemas
/// read from the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSchema {
    /// Schema-dialect identifier (root schemas only)
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,

    /// Identifier string (root schemas only)
    #[serde(rename = "$id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Declared properties, in declaration order
    #[serde(default)]
    pub properties: IndexMap<String, Schema>,

    /// Names of properties that must be present
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    /// Whether properties outside `properties` are permitted
    #[serde(
        rename = "additionalProperties",
        default = "default_true",
        skip_serializing_if = "is_true"
    )]
    pub additional_properties: bool,

    /// Version string (root schemas only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Shared annotations
    #[serde(flatten)]
    pub annotations: Annotations,
}

impl Default for ObjectSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectSchema {
    /// Create an empty, open object schema.
    pub fn new() -> Self {
        Self {
            dialect: None,
            id: None,
            properties: IndexMap::new(),
            required: Vec::new(),
            additional_properties: true,
            version: None,
            annotations: Annotations::default(),
        }
    }

    /// Declare a required property.
    pub fn required(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema.into());
        self
    }

    /// Declare an optional property.
    pub fn optional(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.properties.insert(name.into(), schema.into());
        self
    }

    /// Forbid undeclared properties (`additionalProperties = false`).
    pub fn closed(mut self) -> Self {
        self.additional_properties = false;
        self
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.annotations.description = Some(description.into());
        self
    }

    /// Returns true if `name` is a required property.
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Remove root bookkeeping fields.
    pub fn unroot(&mut self) {
        self.dialect = None;
        self.id = None;
        self.version = None;
        self.annotations.title = None;
    }
}

/// Array node with an optional item schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArraySchema {
    /// Schema every element must satisfy, if given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,

    /// Shared annotations
    #[serde(flatten)]
    pub annotations: Annotations,
}

/// A node of the schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Schema {
    /// `{"type": "object"}`
    Object(ObjectSchema),
    /// `{"type": "array"}`
    Array(ArraySchema),
    /// `{"type": "string"}`
    String(Annotations),
    /// `{"type": "number"}` (also accepts `"integer"` on input)
    #[serde(alias = "integer")]
    Number(Annotations),
    /// `{"type": "boolean"}`
    Boolean(Annotations),
}

impl From<ObjectSchema> for Schema {
    fn from(object: ObjectSchema) -> Self {
        Schema::Object(object)
    }
}

impl From<ArraySchema> for Schema {
    fn from(array: ArraySchema) -> Self {
        Schema::Array(array)
    }
}

impl Schema {
    /// A string leaf.
    pub fn string() -> Self {
        Schema::String(Annotations::default())
    }

    /// A number leaf.
    pub fn number() -> Self {
        Schema::Number(Annotations::default())
    }

    /// A boolean leaf.
    pub fn boolean() -> Self {
        Schema::Boolean(Annotations::default())
    }

    /// An array whose elements must satisfy `items`.
    pub fn array_of(items: impl Into<Schema>) -> Self {
        Schema::Array(ArraySchema {
            items: Some(Box::new(items.into())),
            annotations: Annotations::default(),
        })
    }

    /// An array with unconstrained elements.
    pub fn array() -> Self {
        Schema::Array(ArraySchema::default())
    }

    /// An empty, open object.
    pub fn object() -> Self {
        Schema::Object(ObjectSchema::new())
    }

    /// Node kind.
    pub fn kind(&self) -> SchemaKind {
        match self {
            Schema::Object(_) => SchemaKind::Object,
            Schema::Array(_) => SchemaKind::Array,
            Schema::String(_) => SchemaKind::String,
            Schema::Number(_) => SchemaKind::Number,
            Schema::Boolean(_) => SchemaKind::Boolean,
        }
    }

    /// Shared annotations of this node.
    pub fn annotations(&self) -> &Annotations {
        match self {
            Schema::Object(o) => &o.annotations,
            Schema::Array(a) => &a.annotations,
            Schema::String(a) | Schema::Number(a) | Schema::Boolean(a) => a,
        }
    }

    /// Mutable access to the shared annotations of this node.
    pub fn annotations_mut(&mut self) -> &mut Annotations {
        match self {
            Schema::Object(o) => &mut o.annotations,
            Schema::Array(a) => &mut a.annotations,
            Schema::String(a) | Schema::Number(a) | Schema::Boolean(a) => a,
        }
    }

    /// Set the `format` hint.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.annotations_mut().format = Some(format.into());
        self
    }

    /// Set the `description`.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.annotations_mut().description = Some(description.into());
        self
    }

    /// Set the `default` value.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.annotations_mut().default = Some(default.into());
        self
    }

    /// Restrict values to `allowed` (`enum`).
    pub fn one_of<I, V>(mut self, allowed: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.annotations_mut().allowed = Some(allowed.into_iter().map(Into::into).collect());
        self
    }

    /// Inclusive numeric bounds; `None` leaves a side open.
    pub fn with_range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        let annotations = self.annotations_mut();
        annotations.minimum = minimum;
        annotations.maximum = maximum;
        self
    }

    /// The object node, if this is one.
    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            Schema::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Mutable object node, if this is one.
    pub fn as_object_mut(&mut self) -> Option<&mut ObjectSchema> {
        match self {
            Schema::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Look up a nested property by dotted path (`"File.identifier"`).
    pub fn property(&self, path: &str) -> Option<&Schema> {
        path.split('.').try_fold(self, |node, segment| {
            node.as_object().and_then(|o| o.properties.get(segment))
        })
    }

    /// Verify the structural invariants of the whole tree.
    ///
    /// Fails if any `required` name is missing from its node's `properties`.
    pub fn check(&self) -> Result<(), SchemaError> {
        self.check_at(&mut Vec::new())
    }

    fn check_at(&self, path: &mut Vec<String>) -> Result<(), SchemaError> {
        match self {
            Schema::Object(object) => {
                for name in &object.required {
                    if !object.properties.contains_key(name) {
                        return Err(SchemaError::UnknownRequired {
                            path: join_path(path),
                            name: name.clone(),
                        });
                    }
                }
                for (name, child) in &object.properties {
                    path.push(name.clone());
                    child.check_at(path)?;
                    path.pop();
                }
                Ok(())
            }
            Schema::Array(array) => match &array.items {
                Some(items) => {
                    path.push("[]".to_string());
                    items.check_at(path)?;
                    path.pop();
                    Ok(())
                }
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Parse the wire representation and check invariants.
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let schema: Schema = serde_json::from_value(value)?;
        schema.check()?;
        Ok(schema)
    }

    /// Parse a JSON document and check invariants.
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.check()?;
        Ok(schema)
    }

    /// Serialize to the wire representation.
    pub fn to_value(&self) -> Value {
        // Serialization of this type cannot fail: keys are strings and all
        // leaves are JSON values already.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub(crate) fn join_path(segments: &[String]) -> String {
    let mut out = String::new();
    for segment in segments {
        if !out.is_empty() && !segment.starts_with('[') {
            out.push('.');
        }
        out.push_str(segment);
    }
    out
}
