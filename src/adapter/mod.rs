//! # Adapter Module
//!
//! The capability contract shared by every format adapter and by composite
//! converters.
//!
//! An [`Adapter`] exposes its three structural contracts (source, metadata and
//! options schemas), a best-effort metadata extraction, and a conversion
//! entry point. Opening an adapter reads headers and indexes only; payload
//! data is read inside [`Adapter::run_conversion`], streamed through the
//! chunked iterator into the output store held by the [`RunContext`].
//!
//! [`Converter`] is the composite variant: an ordered set of labeled adapters
//! satisfying the same contract recursively. Registration order is both the
//! metadata precedence order and the execution order.

mod converter;
mod error;
mod options;

#[cfg(test)]
pub(crate) mod mock;

use serde_json::{Map, Value};

use crate::chunking::{stream_chunks, CancellationToken, ChunkSource, StreamStats};
use crate::metadata::MetadataTree;
use crate::schema::Schema;
use crate::store::{ArraySpec, ElementType, OutputStore};

pub use converter::{Converter, SequenceFailure};
pub use error::AdapterError;
pub use options::{parse_options, RunOptions};

/// Capability contract of a format adapter or composite converter.
pub trait Adapter {
    /// Short name of the adapter kind, used in logs and reports.
    fn name(&self) -> &str;

    /// Input locations this adapter needs.
    ///
    /// Must be a pure function of the adapter's configuration.
    fn source_schema(&self) -> Schema;

    /// Metadata this adapter can supply or requires.
    fn metadata_schema(&self) -> Schema;

    /// Run options this adapter accepts.
    fn options_schema(&self) -> Schema;

    /// Best-effort metadata read from the source headers.
    fn metadata(&self) -> MetadataTree;

    /// Default run options.
    fn default_options(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Check merged run options against the adapter's typed options.
    ///
    /// Called after schema validation and before the output store exists, so
    /// anything the schema cannot express (integer-only fields, for one) is
    /// refused without touching the output.
    fn check_options(&self, options: &Map<String, Value>) -> Result<(), AdapterError> {
        let _ = options;
        Ok(())
    }

    /// Read, transform and write the payload.
    ///
    /// `metadata` has already been validated against the composed metadata
    /// schema; `options` against [`Adapter::options_schema`].
    fn run_conversion(
        &mut self,
        ctx: &mut RunContext<'_>,
        metadata: &MetadataTree,
        options: &Map<String, Value>,
    ) -> Result<(), AdapterError>;
}

impl std::fmt::Debug for dyn Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Adapter({})", self.name())
    }
}

/// Exclusive access to the output store for the duration of one run.
///
/// Handed to each adapter in turn; adapters never run concurrently.
#[derive(Debug)]
pub struct RunContext<'a> {
    store: &'a mut OutputStore,
    cancel: &'a CancellationToken,
}

impl<'a> RunContext<'a> {
    /// Wrap the store lease and cancellation flag of a run.
    pub fn new(store: &'a mut OutputStore, cancel: &'a CancellationToken) -> Self {
        Self { store, cancel }
    }

    /// The output store.
    pub fn store(&mut self) -> &mut OutputStore {
        &mut *self.store
    }

    /// The run's cancellation flag.
    pub fn cancel_token(&self) -> &CancellationToken {
        self.cancel
    }

    /// Fail with [`AdapterError::Cancelled`] if cancellation was requested.
    pub fn check_cancelled(&self) -> Result<(), AdapterError> {
        if self.cancel.is_cancelled() {
            Err(AdapterError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Stream `source` into a new array dataset at `path`.
    ///
    /// The chunk plan comes from `options` (memory budget, chunk shape, stub
    /// truncation); the dataset is created with the plan's (possibly
    /// truncated) shape so a complete traversal completes the dataset.
    pub fn write_array<S>(
        &mut self,
        path: &str,
        source: &mut S,
        element_type: ElementType,
        options: &RunOptions,
        attributes: Map<String, Value>,
    ) -> Result<StreamStats, AdapterError>
    where
        S: ChunkSource + ?Sized,
    {
        if source.element_size() != element_type.size() {
            return Err(AdapterError::InvalidData(format!(
                "source element size {} does not match {}",
                source.element_size(),
                element_type
            )));
        }

        let plan = options
            .chunk_config(source.shape().to_vec(), element_type.size())
            .plan()?;
        let mut spec = ArraySpec::new(plan.shape().to_vec(), element_type, plan.chunk_shape().to_vec())
            .with_codec(options.compression, options.compression_level);
        spec.attributes = attributes;

        let mut writer = self.store.create_array(path, spec)?;
        let stats = stream_chunks(&plan, source, &mut writer, self.cancel)?;
        writer.finish()?;
        log::info!(
            "wrote '{}': {} chunks, {} bytes",
            path,
            stats.chunks_written,
            stats.bytes_written
        );
        Ok(stats)
    }
}
