use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use serde_json::{Map, Value};

use super::types::{ArrayMeta, Codec, ElementType, DEFAULT_GZIP_LEVEL};
use super::{OutputStore, StoreError, ARRAY_META_FILE};
use crate::chunking::{ChunkSink, ChunkSlice};

/// Declaration of a new array dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySpec {
    /// Declared shape
    pub shape: Vec<u64>,
    /// Element type
    pub element_type: ElementType,
    /// Physical chunk shape
    pub chunk_shape: Vec<u64>,
    /// Chunk codec
    pub codec: Codec,
    /// Codec level
    pub compression_level: u32,
    /// Free-form attributes stored in `array.json`
    pub attributes: Map<String, Value>,
}

impl ArraySpec {
    /// A gzip-compressed array chunked as `chunk_shape`.
    pub fn new(shape: Vec<u64>, element_type: ElementType, chunk_shape: Vec<u64>) -> Self {
        Self {
            shape,
            element_type,
            chunk_shape,
            codec: Codec::Gzip,
            compression_level: DEFAULT_GZIP_LEVEL,
            attributes: Map::new(),
        }
    }

    /// Select the codec.
    pub fn with_codec(mut self, codec: Codec, level: u32) -> Self {
        self.codec = codec;
        self.compression_level = level;
        self
    }

    /// Attach an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub(super) fn check(&self) -> Result<(), StoreError> {
        if self.shape.is_empty() {
            return Err(StoreError::InvalidSpec("shape has no dimensions".into()));
        }
        if self.chunk_shape.len() != self.shape.len() {
            return Err(StoreError::InvalidSpec(format!(
                "chunk shape {:?} does not match shape {:?}",
                self.chunk_shape, self.shape
            )));
        }
        if self.shape.contains(&0) || self.chunk_shape.contains(&0) {
            return Err(StoreError::InvalidSpec(format!(
                "zero extent in shape {:?} or chunk shape {:?}",
                self.shape, self.chunk_shape
            )));
        }
        Ok(())
    }

    pub(super) fn into_meta(self) -> ArrayMeta {
        ArrayMeta {
            shape: self.shape,
            chunk_shape: self.chunk_shape,
            element_type: self.element_type,
            codec: self.codec,
            compression_level: self.compression_level,
            attributes: self.attributes,
            written_elements: 0,
            complete: false,
        }
    }
}

/// Writer for one array dataset.
///
/// Borrows the store mutably, so at most one dataset is being written at a
/// time. Writes at arbitrary offsets are decomposed into the physical chunk
/// grid; chunks only partly covered by a write are read, patched and
/// rewritten. Every element is written at most once: a write overlapping an
/// earlier one fails with [`StoreError::Overlap`] before touching any chunk.
#[derive(Debug)]
pub struct ArrayWriter<'s> {
    _store: &'s mut OutputStore,
    name: String,
    dir: PathBuf,
    meta: ArrayMeta,
    coverage: Coverage,
}

impl<'s> ArrayWriter<'s> {
    pub(super) fn new(store: &'s mut OutputStore, name: String, dir: PathBuf, meta: ArrayMeta) -> Self {
        Self {
            _store: store,
            name,
            dir,
            meta,
            coverage: Coverage::default(),
        }
    }

    /// Dataset path within the store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current array metadata.
    pub fn meta(&self) -> &ArrayMeta {
        &self.meta
    }

    /// Write row-major `data` covering the box at `offset` with `extent`.
    pub fn write(&mut self, offset: &[u64], extent: &[u64], data: &[u8]) -> Result<(), StoreError> {
        let rank = self.meta.shape.len();
        let in_bounds = offset.len() == rank
            && extent.len() == rank
            && (0..rank).all(|d| offset[d] + extent[d] <= self.meta.shape[d]);
        if !in_bounds {
            return Err(StoreError::OutOfBounds {
                path: self.name.clone(),
                offset: offset.to_vec(),
                extent: extent.to_vec(),
                shape: self.meta.shape.clone(),
            });
        }

        let elem = self.meta.element_type.size();
        let volume: u64 = extent.iter().product();
        let expected = volume as usize * elem;
        if data.len() != expected {
            return Err(StoreError::LengthMismatch {
                expected,
                found: data.len(),
            });
        }
        if volume == 0 {
            return Ok(());
        }

        let first: Vec<u64> = (0..rank).map(|d| offset[d] / self.meta.chunk_shape[d]).collect();
        let last: Vec<u64> = (0..rank)
            .map(|d| (offset[d] + extent[d] - 1) / self.meta.chunk_shape[d])
            .collect();

        let mut targets = Vec::new();
        let mut coords = first.clone();
        'grid: loop {
            let target = self.target(&coords, offset, extent);
            if self.coverage.overlaps(&target) {
                return Err(StoreError::Overlap {
                    path: self.name.clone(),
                    offset: offset.to_vec(),
                    extent: extent.to_vec(),
                });
            }
            targets.push(target);

            let mut dim = rank;
            loop {
                if dim == 0 {
                    break 'grid;
                }
                dim -= 1;
                coords[dim] += 1;
                if coords[dim] <= last[dim] {
                    break;
                }
                coords[dim] = first[dim];
            }
        }

        for target in targets {
            self.write_into_chunk(&target, offset, extent, data)?;
            self.coverage.record(target);
        }
        self.meta.written_elements += volume;
        Ok(())
    }

    /// The part of the box `offset`/`extent` falling in the chunk at `coords`.
    fn target(&self, coords: &[u64], offset: &[u64], extent: &[u64]) -> ChunkTarget {
        let (chunk_offset, chunk_extent) = self.meta.chunk_box(coords);
        let (region_offset, region_extent) = (0..coords.len())
            .map(|d| {
                let start = offset[d].max(chunk_offset[d]);
                let end = (offset[d] + extent[d]).min(chunk_offset[d] + chunk_extent[d]);
                (start, end - start)
            })
            .unzip();
        ChunkTarget {
            coords: coords.to_vec(),
            chunk_offset,
            chunk_extent,
            region_offset,
            region_extent,
        }
    }

    fn write_into_chunk(
        &self,
        target: &ChunkTarget,
        offset: &[u64],
        extent: &[u64],
        data: &[u8],
    ) -> Result<(), StoreError> {
        let elem = self.meta.element_type.size();
        let chunk_bytes = target.chunk_extent.iter().product::<u64>() as usize * elem;

        let path = self.dir.join(ArrayMeta::chunk_key(&target.coords));
        let mut chunk = if target.is_whole_chunk() {
            vec![0u8; chunk_bytes]
        } else if path.exists() {
            let decoded = self.meta.codec.decode(&fs::read(&path)?)?;
            if decoded.len() != chunk_bytes {
                return Err(StoreError::CorruptChunk {
                    path,
                    detail: format!("{} bytes, expected {}", decoded.len(), chunk_bytes),
                });
            }
            decoded
        } else {
            vec![0u8; chunk_bytes]
        };

        copy_region(
            Region {
                data,
                offset,
                extent,
            },
            &mut chunk,
            &target.chunk_offset,
            &target.chunk_extent,
            &target.region_offset,
            &target.region_extent,
            elem,
        );

        let encoded = self
            .meta
            .codec
            .encode(self.meta.compression_level, &chunk)?;
        fs::write(&path, encoded)?;
        Ok(())
    }

    /// Write the final `array.json`, marking the dataset complete when the
    /// written volume equals the declared volume.
    pub fn finish(mut self) -> Result<ArrayMeta, StoreError> {
        self.meta.complete = self.meta.written_elements == self.meta.volume();
        if !self.meta.complete {
            log::warn!(
                "array '{}' finished with {} of {} elements written",
                self.name,
                self.meta.written_elements,
                self.meta.volume()
            );
        }
        self.persist()?;
        log::info!("finished array '{}' {:?}", self.name, self.meta.shape);
        Ok(self.meta)
    }

    fn persist(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.meta)?;
        fs::write(self.dir.join(ARRAY_META_FILE), json)?;
        Ok(())
    }
}

impl ChunkSink for ArrayWriter<'_> {
    type Error = StoreError;

    fn write_chunk(&mut self, slice: &ChunkSlice, data: &[u8]) -> Result<(), StoreError> {
        self.write(&slice.offset, &slice.extent, data)
    }
}

/// One write's footprint inside one chunk (absolute coordinates).
#[derive(Debug)]
struct ChunkTarget {
    coords: Vec<u64>,
    chunk_offset: Vec<u64>,
    chunk_extent: Vec<u64>,
    region_offset: Vec<u64>,
    region_extent: Vec<u64>,
}

impl ChunkTarget {
    fn is_whole_chunk(&self) -> bool {
        self.region_extent == self.chunk_extent
    }
}

/// Written boxes per chunk. Boxes within a chunk never overlap, so a chunk
/// is full once their volumes add up to its own.
#[derive(Debug, Default)]
struct Coverage {
    full: HashSet<Vec<u64>>,
    partial: HashMap<Vec<u64>, Vec<(Vec<u64>, Vec<u64>)>>,
}

impl Coverage {
    fn overlaps(&self, target: &ChunkTarget) -> bool {
        if self.full.contains(&target.coords) {
            return true;
        }
        self.partial.get(&target.coords).is_some_and(|boxes| {
            boxes.iter().any(|(offset, extent)| {
                (0..offset.len()).all(|d| {
                    offset[d] < target.region_offset[d] + target.region_extent[d]
                        && target.region_offset[d] < offset[d] + extent[d]
                })
            })
        })
    }

    fn record(&mut self, target: ChunkTarget) {
        if target.is_whole_chunk() {
            self.full.insert(target.coords);
            return;
        }
        let chunk_volume: u64 = target.chunk_extent.iter().product();
        let boxes = self.partial.entry(target.coords.clone()).or_default();
        boxes.push((target.region_offset, target.region_extent));
        let covered: u64 = boxes.iter().map(|(_, e)| e.iter().product::<u64>()).sum();
        if covered == chunk_volume {
            self.partial.remove(&target.coords);
            self.full.insert(target.coords);
        }
    }
}

/// A row-major source box.
pub(crate) struct Region<'a> {
    pub data: &'a [u8],
    pub offset: &'a [u64],
    pub extent: &'a [u64],
}

/// Copy the box `region_offset`/`region_extent` (absolute coordinates) from
/// `src` into the row-major `dst` box at `dst_offset`/`dst_extent`.
pub(crate) fn copy_region(
    src: Region<'_>,
    dst: &mut [u8],
    dst_offset: &[u64],
    dst_extent: &[u64],
    region_offset: &[u64],
    region_extent: &[u64],
    elem: usize,
) {
    let rank = region_extent.len();
    let src_strides = strides(src.extent);
    let dst_strides = strides(dst_extent);
    let run = region_extent[rank - 1] as usize * elem;
    let rows: u64 = region_extent[..rank - 1].iter().product();

    let mut index = vec![0u64; rank];
    for _ in 0..rows {
        let (mut s, mut d) = (0u64, 0u64);
        for dim in 0..rank {
            let abs = region_offset[dim] + index[dim];
            s += (abs - src.offset[dim]) * src_strides[dim];
            d += (abs - dst_offset[dim]) * dst_strides[dim];
        }
        let (s, d) = (s as usize * elem, d as usize * elem);
        dst[d..d + run].copy_from_slice(&src.data[s..s + run]);

        for dim in (0..rank.saturating_sub(1)).rev() {
            index[dim] += 1;
            if index[dim] < region_extent[dim] {
                break;
            }
            index[dim] = 0;
        }
    }
}

fn strides(extent: &[u64]) -> Vec<u64> {
    let mut out = vec![1u64; extent.len()];
    for dim in (0..extent.len().saturating_sub(1)).rev() {
        out[dim] = out[dim + 1] * extent[dim + 1];
    }
    out
}
