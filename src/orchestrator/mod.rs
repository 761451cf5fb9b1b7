//! # Orchestrator Module
//!
//! Drives one conversion through its states:
//!
//! ```text
//! Constructed ──compose_schemas──▶ SchemaReady ──prepare_metadata──▶ MetadataReady
//!                                       ▲   │ (violation: stays)          │
//!                                       └───┘                            run
//!                                                                         ▼
//!                                               Completed ◀── Running ──▶ Failed
//! ```
//!
//! Every validation (metadata, run options) happens before the output store
//! is created. Adapters then run sequentially against the one store; a
//! failure stops the sequence and leaves the output of earlier adapters in
//! place, reported as committed.

mod error;


use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::adapter::{Adapter, Converter, RunContext, SequenceFailure};
use crate::chunking::CancellationToken;
use crate::metadata::{aggregate_metadata, deep_merge, default_root_metadata, MetadataTree};
use crate::schema::{fill_defaults, validate, Schema, SchemaViolation, ViolationRule};
use crate::store::{OutputStore, StoreManifest, StoreMode};

pub use error::ConversionError;

/// Lifecycle state of an [`Orchestrator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Adapters registered, nothing composed yet
    Constructed,
    /// Schemas composed
    SchemaReady,
    /// Metadata aggregated and validated
    MetadataReady,
    /// Adapters executing
    Running,
    /// All adapters finished
    Completed,
    /// An adapter failed or the run was cancelled
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Constructed => "Constructed",
            PipelineState::SchemaReady => "SchemaReady",
            PipelineState::MetadataReady => "MetadataReady",
            PipelineState::Running => "Running",
            PipelineState::Completed => "Completed",
            PipelineState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// The three composed contracts of a converter
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedSchemas {
    /// Source locations, namespaced by label
    pub source: Schema,
    /// Merged metadata schema
    pub metadata: Schema,
    /// Run options, namespaced by label
    pub options: Schema,
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct ConversionReport {
    /// Store directory
    pub output: PathBuf,
    /// Labels that completed, in order
    pub committed: Vec<String>,
    /// Final store manifest
    pub manifest: StoreManifest,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

/// Sequences schema composition, metadata preparation and adapter execution.
#[derive(Debug)]
pub struct Orchestrator {
    converter: Converter,
    state: PipelineState,
    identifier: String,
    schemas: Option<ComposedSchemas>,
    metadata: Option<MetadataTree>,
}

impl Orchestrator {
    /// Take ownership of a converter. A fresh output identifier is generated.
    pub fn new(converter: Converter) -> Self {
        Self {
            converter,
            state: PipelineState::Constructed,
            identifier: uuid::Uuid::new_v4().to_string(),
            schemas: None,
            metadata: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The registered adapters.
    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    /// Identifier seeded as `File.identifier`.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Composed schemas, once available.
    pub fn schemas(&self) -> Option<&ComposedSchemas> {
        self.schemas.as_ref()
    }

    /// Validated metadata, once available.
    pub fn metadata(&self) -> Option<&MetadataTree> {
        self.metadata.as_ref()
    }

    fn expect_state(&self, allowed: &[PipelineState]) -> Result<(), ConversionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ConversionError::InvalidState {
                expected: allowed[0],
                found: self.state,
            })
        }
    }

    /// Compose the source, metadata and options schemas.
    pub fn compose_schemas(&mut self) -> Result<&ComposedSchemas, ConversionError> {
        self.expect_state(&[PipelineState::Constructed, PipelineState::SchemaReady])?;
        let schemas = ComposedSchemas {
            source: self.converter.source_schema(),
            metadata: self.converter.metadata_schema(),
            options: self.converter.options_schema(),
        };
        log::debug!("composed schemas for {} adapters", self.converter.len());
        self.state = PipelineState::SchemaReady;
        Ok(self.schemas.insert(schemas))
    }

    fn composed(&self) -> Result<&ComposedSchemas, ConversionError> {
        self.schemas.as_ref().ok_or(ConversionError::InvalidState {
            expected: PipelineState::SchemaReady,
            found: self.state,
        })
    }

    /// Validate a source-location tree against the composed source schema.
    pub fn validate_source(&self, source: &Value) -> Result<(), ConversionError> {
        validate(source, &self.composed()?.source)
            .map_err(|violation| ConversionError::Invalid {
                what: "source",
                violation,
            })
    }

    /// Aggregate default, adapter and user metadata without validating.
    ///
    /// Precedence, lowest first: default root metadata, adapters in
    /// registration order, `overrides`.
    pub fn aggregate_metadata(&self, overrides: Option<&MetadataTree>) -> MetadataTree {
        let defaults = default_root_metadata(&self.identifier);
        let extracted: Vec<(&str, MetadataTree)> = self
            .converter
            .iter()
            .map(|(label, adapter)| (label, adapter.metadata()))
            .collect();
        let sources = std::iter::once(("defaults", &defaults))
            .chain(extracted.iter().map(|(label, tree)| (*label, tree)));
        aggregate_metadata(sources, overrides)
    }

    /// Aggregate metadata, apply `overrides` and validate the result.
    ///
    /// On a violation the pipeline stays in `SchemaReady`.
    pub fn prepare_metadata(
        &mut self,
        overrides: Option<&MetadataTree>,
    ) -> Result<&MetadataTree, ConversionError> {
        self.expect_state(&[PipelineState::SchemaReady, PipelineState::MetadataReady])?;
        let merged = self.aggregate_metadata(overrides);

        let outcome = validate(&Value::Object(merged.as_map().clone()), &self.composed()?.metadata);
        if let Err(violation) = outcome {
            self.state = PipelineState::SchemaReady;
            self.metadata = None;
            return Err(ConversionError::Invalid {
                what: "metadata",
                violation,
            });
        }

        self.state = PipelineState::MetadataReady;
        Ok(self.metadata.insert(merged))
    }

    /// The composed metadata schema annotated with the aggregated values as defaults.
    pub fn metadata_schema_with_defaults(&self) -> Result<Schema, ConversionError> {
        let mut schema = self.composed()?.metadata.clone();
        fill_defaults(&mut schema, &self.aggregate_metadata(None));
        Ok(schema)
    }

    /// Merge `user` options over the adapters' defaults and validate.
    ///
    /// Each adapter also checks its own subtree against its typed options, so
    /// every refusal happens before a store is created.
    pub fn resolve_options(&self, user: &Map<String, Value>) -> Result<Map<String, Value>, ConversionError> {
        let mut options = self.converter.default_options();
        deep_merge(&mut options, user, "conversion options");
        validate(&Value::Object(options.clone()), &self.composed()?.options).map_err(|violation| {
            ConversionError::Invalid {
                what: "options",
                violation,
            }
        })?;

        let empty = Map::new();
        for (label, adapter) in self.converter.iter() {
            let child = options.get(label).and_then(Value::as_object).unwrap_or(&empty);
            adapter.check_options(child).map_err(|error| ConversionError::Invalid {
                what: "options",
                violation: SchemaViolation::at(label, ViolationRule::Rejected(error.to_string())),
            })?;
        }
        Ok(options)
    }

    /// Run every adapter into a new store at `output`.
    ///
    /// Options are validated before the store is created. On success the
    /// store is finished; on failure it is left as the last completed write
    /// produced.
    pub fn run(
        &mut self,
        output: &Path,
        mode: StoreMode,
        options: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<ConversionReport, ConversionError> {
        self.expect_state(&[PipelineState::MetadataReady])?;
        let options = self.resolve_options(options)?;
        let metadata = self.metadata.clone().unwrap_or_default();

        let started = Instant::now();
        self.state = PipelineState::Running;
        log::info!(
            "converting {} adapters into {}",
            self.converter.len(),
            output.display()
        );

        let mut store = match OutputStore::create(output, mode) {
            Ok(store) => store,
            Err(e) => {
                self.state = PipelineState::Failed;
                return Err(e.into());
            }
        };
        if let Err(e) = store.write_metadata(&metadata) {
            self.state = PipelineState::Failed;
            return Err(e.into());
        }

        let sequence = {
            let mut ctx = RunContext::new(&mut store, cancel);
            self.converter.run_sequence(&mut ctx, &metadata, &options)
        };

        let committed = match sequence {
            Ok(committed) => committed,
            Err(SequenceFailure {
                committed,
                label,
                error,
            }) => {
                self.state = PipelineState::Failed;
                return Err(if error.is_cancelled() {
                    ConversionError::Cancelled { committed }
                } else {
                    ConversionError::AdapterExecution {
                        label,
                        committed,
                        source: error,
                    }
                });
            }
        };

        let manifest = match store.finish() {
            Ok(manifest) => manifest,
            Err(e) => {
                self.state = PipelineState::Failed;
                return Err(e.into());
            }
        };
        self.state = PipelineState::Completed;

        let elapsed = started.elapsed();
        log::info!(
            "conversion completed in {:.2}s ({} datasets)",
            elapsed.as_secs_f64(),
            manifest.datasets.len()
        );
        Ok(ConversionReport {
            output: output.to_path_buf(),
            committed,
            manifest,
            elapsed,
        })
    }
}
