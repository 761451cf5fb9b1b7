/// Errors raised while reading or building schema definitions.
///
/// These describe malformed schemas, not malformed inputs; input trees that do
/// not satisfy a schema produce a [`super::SchemaViolation`] instead.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A `required` entry names a property that is not declared
    #[error("required property '{name}' is not declared at '{path}'")]
    UnknownRequired {
        /// Dotted path of the offending object node
        path: String,
        /// The undeclared property name
        name: String,
    },

    /// The wire representation could not be parsed
    #[error("invalid schema JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}
