use std::path::PathBuf;

/// Errors that can occur while writing or reading an output store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error serializing/deserializing JSON
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error from the Arrow library
    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    /// Error from the Parquet library
    #[error("Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),

    /// Error loading the stored metadata
    #[error("Metadata error: {0}")]
    MetadataError(#[from] crate::metadata::MetadataError),

    /// Store already exists and overwrite was not requested
    #[error("Store already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Path exists but is not an output store
    #[error("Not an output store: {}", .0.display())]
    NotAStore(PathBuf),

    /// Another writer holds the store
    #[error("Store is locked by another writer: {}", .0.display())]
    Locked(PathBuf),

    /// Dataset path is empty or contains invalid segments
    #[error("Invalid dataset path: {0:?}")]
    InvalidDatasetPath(String),

    /// A dataset with this path already exists in the store
    #[error("Dataset already exists: {0}")]
    DatasetExists(String),

    /// No dataset with this path exists in the store
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    /// Unknown element type name
    #[error("Unknown element type: {0}")]
    UnknownElementType(String),

    /// Array specification is inconsistent
    #[error("Invalid array specification: {0}")]
    InvalidSpec(String),

    /// A write lies outside the declared dataset shape
    #[error("Write at {offset:?} with extent {extent:?} exceeds shape {shape:?} of {path}")]
    OutOfBounds {
        /// Dataset path
        path: String,
        /// Write offset
        offset: Vec<u64>,
        /// Write extent
        extent: Vec<u64>,
        /// Declared shape
        shape: Vec<u64>,
    },

    /// A write covers elements an earlier write already set
    #[error("Write at {offset:?} with extent {extent:?} overlaps data already written to {path}")]
    Overlap {
        /// Dataset path
        path: String,
        /// Write offset
        offset: Vec<u64>,
        /// Write extent
        extent: Vec<u64>,
    },

    /// Payload length does not match the declared extent
    #[error("Payload of {found} bytes does not match the {expected} bytes declared")]
    LengthMismatch {
        /// Bytes expected from the extent and element size
        expected: usize,
        /// Bytes supplied
        found: usize,
    },

    /// A stored chunk could not be decoded
    #[error("Corrupt chunk {}: {detail}", .path.display())]
    CorruptChunk {
        /// Chunk file
        path: PathBuf,
        /// What went wrong
        detail: String,
    },
}
