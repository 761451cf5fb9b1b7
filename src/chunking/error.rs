/// Errors raised while planning chunked iteration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    /// Dataset shape has no dimensions
    #[error("Dataset shape must have at least one dimension")]
    EmptyShape,

    /// A dimension extent is zero
    #[error("Dimension {dim} of {name} has zero extent")]
    ZeroExtent {
        /// Which shape (`"dataset"` or `"chunk"`)
        name: &'static str,
        /// Dimension index
        dim: usize,
    },

    /// Element size is zero
    #[error("Element size must be positive")]
    ZeroElementSize,

    /// Preferred chunk shape rank differs from the dataset rank
    #[error("Chunk shape has {found} dimensions, dataset has {expected}")]
    RankMismatch {
        /// Dataset rank
        expected: usize,
        /// Chunk shape rank
        found: usize,
    },

    /// The memory budget cannot hold a single element row
    #[error("Buffer budget of {budget} bytes is smaller than the {required} bytes needed")]
    BudgetTooSmall {
        /// Configured budget in bytes
        budget: u64,
        /// Smallest feasible buffer in bytes
        required: u64,
    },

    /// A computed plan does not partition the index space exactly.
    ///
    /// This is an internal invariant violation and must be treated as fatal.
    #[error("Chunk plan does not cover dimension {dim} exactly: {detail}")]
    Coverage {
        /// Dimension index
        dim: usize,
        /// What went wrong
        detail: String,
    },
}

/// Errors raised while streaming chunks from a source into a sink
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Reading a chunk from the source failed
    #[error("Failed to read chunk at {offset:?}: {source}")]
    Read {
        /// Offset of the chunk being read
        offset: Vec<u64>,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The source produced the wrong number of bytes for a chunk
    #[error("Chunk at {offset:?} produced {found} bytes, expected {expected}")]
    ShortRead {
        /// Offset of the chunk being read
        offset: Vec<u64>,
        /// Expected byte length
        expected: usize,
        /// Actual byte length
        found: usize,
    },

    /// Writing a chunk to the sink failed
    #[error("Failed to write chunk: {0}")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Cancellation was requested between chunks
    #[error("Cancelled after {chunks_written} chunks")]
    Cancelled {
        /// Chunks fully written before cancellation
        chunks_written: usize,
    },
}
