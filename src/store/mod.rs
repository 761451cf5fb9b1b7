//! # Store Module
//!
//! The output store is the single persisted target shared by every adapter of
//! a conversion run. It is a directory bundle:
//!
//! ```text
//! session.confluence/
//! ├── store.json                      # Manifest: version, creation time, datasets
//! ├── metadata.json                   # Final merged metadata
//! ├── .lock                           # Present while a writer holds the store
//! ├── acquisition/ElectricalSeriesRaw/
//! │   ├── array.json                  # Shape, element type, chunking, codec
//! │   ├── 0.0                         # One file per physical chunk
//! │   └── 1.0
//! └── intervals/trials/
//!     └── table.parquet
//! ```
//!
//! ## Exclusive ownership
//!
//! Creating a store acquires a [`StoreLease`] backed by a `.lock` file created
//! with `create_new`, so a second writer fails with [`StoreError::Locked`].
//! The lease is released when the [`OutputStore`] is dropped. Array writers
//! borrow the store mutably, so only one dataset is written at a time.
//!
//! ## Write contract
//!
//! An array dataset is created with a fixed shape, element type, physical
//! chunk shape and codec. Each write lands at its declared offset; the
//! dataset is marked complete once the written volume equals the declared
//! volume. A run that stops early leaves the chunks already written in place.

mod array;
mod error;
mod reader;
mod table;
mod types;


use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use serde_json::{Map, Value};

use crate::metadata::MetadataTree;

pub use array::{ArraySpec, ArrayWriter};
pub use error::StoreError;
pub use reader::StoreReader;
pub use table::TABLE_FILE;
pub use types::{
    ArrayMeta, Codec, DatasetEntry, DatasetKind, ElementType, StoreManifest, DEFAULT_GZIP_LEVEL,
};

pub(crate) use array::{copy_region, Region};

/// Conventional extension of a store directory.
pub const STORE_EXTENSION: &str = "confluence";

/// Manifest file name.
pub const MANIFEST_FILE: &str = "store.json";

/// Metadata file name.
pub const METADATA_FILE: &str = "metadata.json";

/// Lock file name.
pub const LOCK_FILE: &str = ".lock";

/// Array metadata file name.
pub const ARRAY_META_FILE: &str = "array.json";

/// Store layout version.
pub const FORMAT_VERSION: &str = "1.0";

/// How to treat an existing store at the target path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreMode {
    /// Fail if the path exists
    #[default]
    Create,
    /// Replace an existing (unlocked) store
    Overwrite,
}

/// Exclusive-ownership token for a store directory.
///
/// Holding the lease means holding the `.lock` file; dropping it removes the
/// file.
#[derive(Debug)]
pub struct StoreLease {
    path: PathBuf,
}

impl StoreLease {
    /// Acquire the lease for the store at `root`.
    pub fn acquire(root: &Path) -> Result<Self, StoreError> {
        let path = root.join(LOCK_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::Locked(root.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{}", std::process::id())?;
        Ok(Self { path })
    }
}

impl Drop for StoreLease {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("failed to release {}: {}", self.path.display(), e);
        }
    }
}

/// An output store open for writing.
#[derive(Debug)]
pub struct OutputStore {
    root: PathBuf,
    manifest: StoreManifest,
    _lease: StoreLease,
}

impl OutputStore {
    /// Create a store directory at `path` and acquire its lease.
    ///
    /// With [`StoreMode::Overwrite`], an existing store is removed first; a
    /// locked store or a non-store path is never removed.
    pub fn create<P: AsRef<Path>>(path: P, mode: StoreMode) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();

        if root.exists() {
            match mode {
                StoreMode::Create => return Err(StoreError::AlreadyExists(root)),
                StoreMode::Overwrite => {
                    if root.join(LOCK_FILE).exists() {
                        return Err(StoreError::Locked(root));
                    }
                    if !root.join(MANIFEST_FILE).is_file() {
                        return Err(StoreError::NotAStore(root));
                    }
                    log::info!("overwriting existing store {}", root.display());
                    fs::remove_dir_all(&root)?;
                }
            }
        }

        fs::create_dir_all(&root)?;
        let lease = StoreLease::acquire(&root)?;
        let store = Self {
            root,
            manifest: StoreManifest::new(),
            _lease: lease,
        };
        store.write_manifest()?;
        log::info!("created store {}", store.root.display());
        Ok(store)
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current manifest.
    pub fn manifest(&self) -> &StoreManifest {
        &self.manifest
    }

    /// Returns true if a dataset with this path exists.
    pub fn contains(&self, path: &str) -> bool {
        self.manifest.datasets.iter().any(|d| d.path == path)
    }

    /// Write the final merged metadata to `metadata.json`.
    pub fn write_metadata(&mut self, metadata: &MetadataTree) -> Result<(), StoreError> {
        fs::write(self.root.join(METADATA_FILE), metadata.to_json_pretty()?)?;
        Ok(())
    }

    /// Create an array dataset and return its writer.
    pub fn create_array(&mut self, path: &str, spec: ArraySpec) -> Result<ArrayWriter<'_>, StoreError> {
        spec.check()?;
        let dir = self.register(path, DatasetKind::Array)?;
        let meta = spec.into_meta();
        fs::write(dir.join(ARRAY_META_FILE), serde_json::to_string_pretty(&meta)?)?;
        log::debug!(
            "created array '{}' {:?} {} chunks {:?} codec {}",
            path,
            meta.shape,
            meta.element_type,
            meta.chunk_shape,
            meta.codec
        );
        Ok(ArrayWriter::new(self, path.to_string(), dir, meta))
    }

    /// Write a table dataset from record batches sharing one schema.
    pub fn write_table(
        &mut self,
        path: &str,
        batches: &[RecordBatch],
        codec: Codec,
        level: u32,
        attributes: &Map<String, Value>,
    ) -> Result<usize, StoreError> {
        let dir = self.register(path, DatasetKind::Table)?;
        let rows = table::write_table_file(&dir, batches, codec, level, attributes)?;
        log::info!("wrote table '{}' ({} rows)", path, rows);
        Ok(rows)
    }

    fn register(&mut self, path: &str, kind: DatasetKind) -> Result<PathBuf, StoreError> {
        check_dataset_path(path)?;
        if self.contains(path) {
            return Err(StoreError::DatasetExists(path.to_string()));
        }
        let dir = self.root.join(path);
        fs::create_dir_all(&dir)?;
        self.manifest.datasets.push(DatasetEntry {
            path: path.to_string(),
            kind,
        });
        self.write_manifest()?;
        Ok(dir)
    }

    fn write_manifest(&self) -> Result<(), StoreError> {
        let file = File::create(self.root.join(MANIFEST_FILE))?;
        serde_json::to_writer_pretty(file, &self.manifest)?;
        Ok(())
    }

    /// Mark the store finished and release the lease.
    pub fn finish(mut self) -> Result<StoreManifest, StoreError> {
        self.manifest.finished = true;
        self.write_manifest()?;
        log::info!(
            "finished store {} ({} datasets)",
            self.root.display(),
            self.manifest.datasets.len()
        );
        Ok(self.manifest.clone())
    }
}

/// Check a slash-separated dataset path.
pub fn check_dataset_path(path: &str) -> Result<(), StoreError> {
    let valid = !path.is_empty()
        && path.split('/').all(|segment| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && !segment.starts_with('.')
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        });
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidDatasetPath(path.to_string()))
    }
}
