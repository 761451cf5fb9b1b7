/// Errors that can occur while loading metadata or option trees
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// I/O error reading a metadata file
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// The document root is not a mapping
    #[error("Metadata root must be an object, found {0}")]
    NotAnObject(&'static str),

    /// File extension is neither `.json` nor `.toml`
    #[error("Unsupported metadata file extension: {0}")]
    UnsupportedFormat(String),
}
