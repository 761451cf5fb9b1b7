use super::PipelineState;
use crate::adapter::AdapterError;
use crate::schema::SchemaViolation;
use crate::store::StoreError;

/// Errors surfaced by the orchestrator
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// An input tree failed validation; nothing was written
    #[error("Invalid {what}: {violation}")]
    Invalid {
        /// Which tree (`"source"`, `"metadata"` or `"options"`)
        what: &'static str,
        /// The first violation found
        #[source]
        violation: SchemaViolation,
    },

    /// An operation was called in the wrong pipeline state
    #[error("Operation requires state {expected}, pipeline is {found}")]
    InvalidState {
        /// Required state
        expected: PipelineState,
        /// Current state
        found: PipelineState,
    },

    /// The output store could not be created or finished
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    /// An adapter failed; earlier adapters' output stays in the store
    #[error("Adapter '{label}' failed after committing {committed:?}: {source}")]
    AdapterExecution {
        /// Label of the failing adapter
        label: String,
        /// Labels that completed before it
        committed: Vec<String>,
        /// The adapter's error
        #[source]
        source: AdapterError,
    },

    /// The run was cancelled between chunks
    #[error("Conversion cancelled after committing {committed:?}")]
    Cancelled {
        /// Labels that completed before cancellation
        committed: Vec<String>,
    },
}

impl ConversionError {
    /// Labels whose output was committed before the failure.
    pub fn committed(&self) -> &[String] {
        match self {
            ConversionError::AdapterExecution { committed, .. }
            | ConversionError::Cancelled { committed } => committed,
            _ => &[],
        }
    }
}
