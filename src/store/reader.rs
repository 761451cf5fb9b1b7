use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::types::{ArrayMeta, DatasetEntry, DatasetKind, StoreManifest};
use super::{copy_region, Region, StoreError, ARRAY_META_FILE, MANIFEST_FILE, METADATA_FILE, TABLE_FILE};
use crate::metadata::MetadataTree;

/// Read-only view of a store on disk.
#[derive(Debug, Clone)]
pub struct StoreReader {
    root: PathBuf,
    manifest: StoreManifest,
}

impl StoreReader {
    /// Open the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(StoreError::NotAStore(root));
        }
        let manifest = serde_json::from_reader(File::open(manifest_path)?)?;
        Ok(Self { root, manifest })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store manifest.
    pub fn manifest(&self) -> &StoreManifest {
        &self.manifest
    }

    /// Datasets in creation order.
    pub fn datasets(&self) -> &[DatasetEntry] {
        &self.manifest.datasets
    }

    /// The stored metadata, or an empty tree if none was written.
    pub fn metadata(&self) -> Result<MetadataTree, StoreError> {
        let path = self.root.join(METADATA_FILE);
        if !path.exists() {
            return Ok(MetadataTree::new());
        }
        Ok(MetadataTree::from_json_str(&fs::read_to_string(path)?)?)
    }

    fn dataset_dir(&self, path: &str, kind: DatasetKind) -> Result<PathBuf, StoreError> {
        self.manifest
            .datasets
            .iter()
            .find(|d| d.path == path && d.kind == kind)
            .map(|d| self.root.join(&d.path))
            .ok_or_else(|| StoreError::DatasetNotFound(path.to_string()))
    }

    /// Metadata of an array dataset.
    pub fn array_meta(&self, path: &str) -> Result<ArrayMeta, StoreError> {
        let dir = self.dataset_dir(path, DatasetKind::Array)?;
        Ok(serde_json::from_reader(File::open(dir.join(ARRAY_META_FILE))?)?)
    }

    /// Read a whole array as row-major bytes. Chunks never written read as zeros.
    pub fn read_array(&self, path: &str) -> Result<(ArrayMeta, Vec<u8>), StoreError> {
        let dir = self.dataset_dir(path, DatasetKind::Array)?;
        let meta = self.array_meta(path)?;
        let elem = meta.element_type.size();
        let mut dense = vec![0u8; meta.volume() as usize * elem];
        let origin = vec![0u64; meta.shape.len()];

        let grid = meta.chunk_grid();
        let total: u64 = grid.iter().product();
        let mut coords = vec![0u64; grid.len()];
        for _ in 0..total {
            let chunk_path = dir.join(ArrayMeta::chunk_key(&coords));
            if chunk_path.exists() {
                let (offset, extent) = meta.chunk_box(&coords);
                let data = meta.codec.decode(&fs::read(&chunk_path)?)?;
                let expected = extent.iter().product::<u64>() as usize * elem;
                if data.len() != expected {
                    return Err(StoreError::CorruptChunk {
                        path: chunk_path,
                        detail: format!("{} bytes, expected {}", data.len(), expected),
                    });
                }
                copy_region(
                    Region {
                        data: &data,
                        offset: &offset,
                        extent: &extent,
                    },
                    &mut dense,
                    &origin,
                    &meta.shape,
                    &offset,
                    &extent,
                    elem,
                );
            }

            for dim in (0..coords.len()).rev() {
                coords[dim] += 1;
                if coords[dim] < grid[dim] {
                    break;
                }
                coords[dim] = 0;
            }
        }

        Ok((meta, dense))
    }

    /// Read a table dataset.
    pub fn read_table(&self, path: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let dir = self.dataset_dir(path, DatasetKind::Table)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(dir.join(TABLE_FILE))?)?
            .build()?;
        let mut batches = Vec::new();
        for batch in reader {
            batches.push(batch?);
        }
        Ok(batches)
    }

    /// Key-value attributes of a table dataset.
    pub fn table_attributes(&self, path: &str) -> Result<HashMap<String, String>, StoreError> {
        let dir = self.dataset_dir(path, DatasetKind::Table)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(dir.join(TABLE_FILE))?)?;
        let attributes = builder
            .metadata()
            .file_metadata()
            .key_value_metadata()
            .map(|kvs| {
                kvs.iter()
                    .filter(|kv| !kv.key.starts_with("ARROW:"))
                    .filter_map(|kv| Some((kv.key.clone(), kv.value.clone()?)))
                    .collect()
            })
            .unwrap_or_default();
        Ok(attributes)
    }
}
