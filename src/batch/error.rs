use crate::adapter::AdapterError;
use crate::metadata::MetadataError;
use crate::orchestrator::ConversionError;
use crate::schema::SchemaViolation;

/// Errors raised while loading or running a conversion file
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// I/O error reading the conversion file
    #[error("Failed to read conversion file: {0}")]
    IoError(#[from] std::io::Error),

    /// The file is not valid TOML
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// The file does not have the expected layout
    #[error("Invalid conversion file: {0}")]
    Layout(#[from] serde_json::Error),

    /// Metadata tables could not be read
    #[error("Metadata error: {0}")]
    MetadataError(#[from] MetadataError),

    /// `[adapters]` names an unknown kind
    #[error("Adapter '{label}': {source}")]
    UnknownKind {
        /// Label in `[adapters]`
        label: String,
        /// Lookup failure
        #[source]
        source: AdapterError,
    },

    /// A session's source data does not satisfy the composed source schema
    #[error("Session '{session}': invalid source data: {violation}")]
    InvalidSource {
        /// `<experiment>/<index>`
        session: String,
        /// First violation
        #[source]
        violation: SchemaViolation,
    },

    /// An adapter could not be opened on its source data
    #[error("Session '{session}': cannot open adapter '{label}': {source}")]
    Open {
        /// `<experiment>/<index>`
        session: String,
        /// Adapter label
        label: String,
        /// Open failure
        #[source]
        source: AdapterError,
    },

    /// A session's conversion failed; later sessions were not run
    #[error("Session '{session}': {source}")]
    Conversion {
        /// `<experiment>/<index>`
        session: String,
        /// Sessions that completed before it
        completed: Vec<String>,
        /// The conversion failure
        #[source]
        source: ConversionError,
    },
}
