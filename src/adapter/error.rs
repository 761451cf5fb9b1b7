use crate::chunking::{ChunkError, StreamError};
use crate::store::StoreError;

/// Errors raised inside one adapter's conversion
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// I/O error reading the source
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error writing to the output store
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    /// Chunk planning failed
    #[error("Chunk planning error: {0}")]
    ChunkError(#[from] ChunkError),

    /// Streaming a dataset failed
    #[error("Streaming error: {0}")]
    StreamError(StreamError),

    /// CSV parsing error
    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error from the Arrow library
    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    /// Run options could not be deserialised
    #[error("Invalid conversion options: {0}")]
    InvalidOptions(#[source] serde_json::Error),

    /// Source locations are missing or unreadable
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// Source content is malformed
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// No adapter kind has this name
    #[error("Unknown adapter kind: {0}")]
    UnknownKind(String),

    /// A label was registered twice in one converter
    #[error("Duplicate adapter label: {0}")]
    DuplicateLabel(String),

    /// Cancellation was requested between chunks
    #[error("Cancelled")]
    Cancelled,

    /// A child adapter of a composite converter failed
    #[error("Adapter '{label}' failed: {source}")]
    Child {
        /// Label of the failing child
        label: String,
        /// The child's error
        #[source]
        source: Box<AdapterError>,
    },
}

impl AdapterError {
    /// Returns true if this error, or the innermost child error, is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            AdapterError::Cancelled => true,
            AdapterError::Child { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<StreamError> for AdapterError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Cancelled { .. } => AdapterError::Cancelled,
            other => AdapterError::StreamError(other),
        }
    }
}
