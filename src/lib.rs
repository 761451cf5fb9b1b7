//! # Confluence - Schema-Validated Multi-Format Conversion
//!
//! `confluence` combines many independently developed format adapters into
//! one conversion pipeline that produces a single output store. Each adapter
//! declares three structural contracts (where its source data lives, what
//! metadata it can supply or needs, which run options it accepts); the
//! pipeline composes them, validates every input tree before touching the
//! output, and streams large numeric datasets through a bounded-memory
//! chunk iterator.
//!
//! ## Key Features
//!
//! - **Composable contracts**: source and options schemas are namespaced by
//!   adapter label, metadata schemas are deep-merged, since all adapters
//!   describe the same logical output.
//!
//! - **Deterministic metadata precedence**: defaults, then adapters in
//!   registration order, then user overrides; nested mappings are unioned
//!   and leaves replaced.
//!
//! - **Bounded memory**: arrays are written chunk by chunk with a buffer no
//!   larger than the configured budget, and a stub mode truncates every
//!   dataset to a short leading prefix for quick trial runs.
//!
//! - **Cooperative cancellation**: a shared token is checked between chunks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use confluence::prelude::*;
//! use serde_json::{json, Map};
//!
//! let recording = AdapterKind::BinaryRecording
//!     .open(&json!({"file_path": "session.imec0.ap.bin"}))?;
//! let trials = AdapterKind::CsvTimeIntervals.open(&json!({"file_path": "trials.csv"}))?;
//! let converter = Converter::new()
//!     .with("Recording", recording)?
//!     .with("Trials", trials)?;
//!
//! let mut orchestrator = Orchestrator::new(converter);
//! orchestrator.compose_schemas()?;
//! let overrides = MetadataTree::from_value(json!({"File": {"lab": "Systems"}}))?;
//! orchestrator.prepare_metadata(Some(&overrides))?;
//!
//! let report = orchestrator.run(
//!     "session.confluence".as_ref(),
//!     StoreMode::Create,
//!     &Map::new(),
//!     &CancellationToken::new(),
//! )?;
//! println!("committed {:?}", report.committed);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! This creates a directory structure:
//! ```text
//! session.confluence/
//! ├── store.json                                # manifest
//! ├── metadata.json                             # validated metadata tree
//! ├── acquisition/ElectricalSeriesRaw/array.json
//! ├── acquisition/ElectricalSeriesRaw/0.0       # gzip chunks
//! └── intervals/trials/table.parquet
//! ```
//!
//! ## Architecture
//!
//! - [`schema`]: typed schema AST, composition and fail-fast validation
//! - [`metadata`]: metadata trees and the deep-merge aggregator
//! - [`chunking`]: chunk planning and the streaming iterator
//! - [`store`]: the output store (chunked arrays and Parquet tables)
//! - [`adapter`]: the adapter capability contract and composite converter
//! - [`orchestrator`]: the conversion state machine
//! - [`formats`]: concrete leaf adapters
//! - [`batch`]: TOML conversion files with experiments and sessions
//! - [`report`]: check reports printed by the CLI

// Documentation lints - enforce complete documentation for publication
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod adapter;
pub mod batch;
pub mod chunking;
pub mod formats;
pub mod metadata;
pub mod orchestrator;
pub mod report;
pub mod schema;
pub mod store;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::adapter::{Adapter, AdapterError, Converter, RunContext, RunOptions};
    pub use crate::batch::{run_batch, BatchError, BatchSettings, ConversionFile};
    pub use crate::chunking::{CancellationToken, ChunkConfig, ChunkPlan, ChunkSlice, ChunkSource};
    pub use crate::formats::{AdapterKind, BinaryRecordingAdapter, CsvTimeIntervalsAdapter};
    pub use crate::metadata::{aggregate_metadata, MetadataTree};
    pub use crate::orchestrator::{ConversionError, ConversionReport, Orchestrator, PipelineState};
    pub use crate::report::{Check, CheckStatus, Report};
    pub use crate::schema::{validate, ObjectSchema, Schema, SchemaViolation};
    pub use crate::store::{OutputStore, StoreMode, StoreReader};
}
