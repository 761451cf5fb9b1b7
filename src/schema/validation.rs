//! Fail-fast validation of input trees against a [`Schema`].
//!
//! Traversal order is deterministic: an object's declared properties are
//! visited in declaration order (depth-first), then any undeclared properties
//! of the input are checked in input order. The first violation found is
//! returned.

use std::fmt;

use serde_json::Value;

use super::{join_path, Annotations, Schema, SchemaKind};

/// The rule an input tree broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationRule {
    /// A required property is absent
    MissingRequired,
    /// A value has the wrong kind
    TypeMismatch {
        /// Kind declared by the schema
        expected: SchemaKind,
        /// Kind of the value found (`"null"` included)
        found: &'static str,
    },
    /// A property is present where `additionalProperties = false`
    UnexpectedProperty,
    /// A value is not one of the schema's `enum` values
    NotAllowed {
        /// The accepted values
        allowed: Vec<Value>,
    },
    /// A number lies outside `minimum`/`maximum`
    OutOfRange {
        /// The bound that was broken, e.g. `"minimum 0"`
        bound: String,
    },
    /// An adapter refused a value the schema accepted
    Rejected(String),
}

impl fmt::Display for ViolationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationRule::MissingRequired => write!(f, "missing required property"),
            ViolationRule::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {}, found {}", expected, found)
            }
            ViolationRule::UnexpectedProperty => write!(f, "unexpected property"),
            ViolationRule::NotAllowed { allowed } => {
                let allowed: Vec<String> = allowed.iter().map(Value::to_string).collect();
                write!(f, "value not one of [{}]", allowed.join(", "))
            }
            ViolationRule::OutOfRange { bound } => write!(f, "value outside {}", bound),
            ViolationRule::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

/// First violation found while validating an input tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("schema violation at '{}': {rule}", display_path(.path))]
pub struct SchemaViolation {
    /// Full dotted path of the offending property (empty for the root)
    pub path: String,
    /// Which rule was broken
    pub rule: ViolationRule,
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

impl SchemaViolation {
    fn new(path: &[String], rule: ViolationRule) -> Self {
        Self {
            path: join_path(path),
            rule,
        }
    }

    /// A violation at an explicit dotted `path`.
    pub fn at(path: impl Into<String>, rule: ViolationRule) -> Self {
        Self {
            path: path.into(),
            rule,
        }
    }

    /// Prefix the path with a namespace (e.g. a session or adapter label).
    pub fn within(mut self, prefix: &str) -> Self {
        self.path = if self.path.is_empty() {
            prefix.to_string()
        } else if self.path.starts_with('[') {
            format!("{prefix}{}", self.path)
        } else {
            format!("{prefix}.{}", self.path)
        };
        self
    }
}

/// Kind name of a JSON value, as reported in type mismatches.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate `tree` against `schema`, returning the first violation.
pub fn validate(tree: &Value, schema: &Schema) -> Result<(), SchemaViolation> {
    let mut path = Vec::new();
    validate_node(tree, schema, &mut path)
}

fn validate_node(value: &Value, schema: &Schema, path: &mut Vec<String>) -> Result<(), SchemaViolation> {
    let kind = schema.kind();
    if !kind.matches(value) {
        return Err(SchemaViolation::new(
            path,
            ViolationRule::TypeMismatch {
                expected: kind,
                found: value_kind(value),
            },
        ));
    }
    check_annotations(value, schema.annotations(), path)?;

    match (schema, value) {
        (Schema::Object(object), Value::Object(map)) => {
            for (name, child) in &object.properties {
                path.push(name.clone());
                match map.get(name) {
                    Some(child_value) => validate_node(child_value, child, path)?,
                    None if object.is_required(name) => {
                        return Err(SchemaViolation::new(path, ViolationRule::MissingRequired));
                    }
                    None => {}
                }
                path.pop();
            }

            if !object.additional_properties {
                if let Some(name) = map.keys().find(|k| !object.properties.contains_key(*k)) {
                    path.push(name.clone());
                    return Err(SchemaViolation::new(path, ViolationRule::UnexpectedProperty));
                }
            }
            Ok(())
        }
        (Schema::Array(array), Value::Array(elements)) => {
            if let Some(items) = &array.items {
                for (index, element) in elements.iter().enumerate() {
                    path.push(format!("[{index}]"));
                    validate_node(element, items, path)?;
                    path.pop();
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_annotations(value: &Value, annotations: &Annotations, path: &[String]) -> Result<(), SchemaViolation> {
    if let Some(allowed) = &annotations.allowed {
        if !allowed.contains(value) {
            return Err(SchemaViolation::new(
                path,
                ViolationRule::NotAllowed {
                    allowed: allowed.clone(),
                },
            ));
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(minimum) = annotations.minimum.filter(|&min| number < min) {
            return Err(SchemaViolation::new(
                path,
                ViolationRule::OutOfRange {
                    bound: format!("minimum {minimum}"),
                },
            ));
        }
        if let Some(maximum) = annotations.maximum.filter(|&max| number > max) {
            return Err(SchemaViolation::new(
                path,
                ViolationRule::OutOfRange {
                    bound: format!("maximum {maximum}"),
                },
            ));
        }
    }
    Ok(())
}
