use std::iter::FusedIterator;

use super::ChunkError;

/// One chunk of a plan: an axis-aligned box of the dataset index space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkSlice {
    /// Start index along each dimension
    pub offset: Vec<u64>,
    /// Number of elements along each dimension
    pub extent: Vec<u64>,
}

impl ChunkSlice {
    /// Number of elements covered.
    pub fn volume(&self) -> u64 {
        self.extent.iter().product()
    }

    /// Size in bytes of the chunk's payload in row-major layout.
    pub fn byte_len(&self, element_size: usize) -> usize {
        self.volume() as usize * element_size
    }

    /// Exclusive end index along `dim`.
    pub fn end(&self, dim: usize) -> u64 {
        self.offset[dim] + self.extent[dim]
    }
}

/// A verified partition of a dataset shape into iteration buffers.
///
/// Construction checks that, along every dimension, the segments start at 0,
/// are contiguous and non-empty, and end exactly at the extent. The Cartesian
/// product of those segments is then a non-overlapping, fully covering set of
/// boxes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    shape: Vec<u64>,
    buffer_shape: Vec<u64>,
    chunk_shape: Vec<u64>,
    segments: Vec<Vec<(u64, u64)>>,
}

impl ChunkPlan {
    /// Build a plan that tiles `shape` with `buffer_shape`, clipping the last
    /// tile of each dimension at the boundary.
    ///
    /// `chunk_shape` is the physical chunking recorded alongside the plan.
    pub fn new(
        shape: Vec<u64>,
        buffer_shape: Vec<u64>,
        chunk_shape: Vec<u64>,
    ) -> Result<Self, ChunkError> {
        if buffer_shape.len() != shape.len() {
            return Err(ChunkError::RankMismatch {
                expected: shape.len(),
                found: buffer_shape.len(),
            });
        }

        let segments = shape
            .iter()
            .zip(&buffer_shape)
            .map(|(&extent, &step)| tile(extent, step))
            .collect();
        let plan = Self {
            shape,
            buffer_shape,
            chunk_shape,
            segments,
        };
        plan.verify()?;
        Ok(plan)
    }

    fn verify(&self) -> Result<(), ChunkError> {
        for (dim, (segments, &extent)) in self.segments.iter().zip(&self.shape).enumerate() {
            let mut cursor = 0u64;
            for &(start, len) in segments {
                if start != cursor {
                    return Err(ChunkError::Coverage {
                        dim,
                        detail: format!("segment starts at {start}, expected {cursor}"),
                    });
                }
                if len == 0 {
                    return Err(ChunkError::Coverage {
                        dim,
                        detail: format!("empty segment at {start}"),
                    });
                }
                cursor += len;
            }
            if cursor != extent {
                return Err(ChunkError::Coverage {
                    dim,
                    detail: format!("segments end at {cursor}, extent is {extent}"),
                });
            }
        }
        Ok(())
    }

    /// The (possibly truncated) index space the plan covers.
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Shape of a full iteration buffer.
    pub fn buffer_shape(&self) -> &[u64] {
        &self.buffer_shape
    }

    /// Physical chunk shape of the output dataset.
    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    /// Bytes needed to hold one full iteration buffer.
    pub fn buffer_bytes(&self, element_size: usize) -> usize {
        self.buffer_shape.iter().product::<u64>() as usize * element_size
    }

    /// Number of chunks the plan yields.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Vec::len).product()
    }

    /// Returns true if the plan yields no chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a fresh row-major traversal.
    pub fn iter(&self) -> ChunkIter<'_> {
        ChunkIter {
            plan: self,
            index: vec![0; self.segments.len()],
            remaining: self.len(),
        }
    }
}

impl<'a> IntoIterator for &'a ChunkPlan {
    type Item = ChunkSlice;
    type IntoIter = ChunkIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn tile(extent: u64, step: u64) -> Vec<(u64, u64)> {
    if step == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(extent.div_ceil(step) as usize);
    let mut start = 0;
    while start < extent {
        let len = step.min(extent - start);
        out.push((start, len));
        start += len;
    }
    out
}

/// Row-major (first dimension slowest) traversal of a [`ChunkPlan`].
#[derive(Debug, Clone)]
pub struct ChunkIter<'a> {
    plan: &'a ChunkPlan,
    index: Vec<usize>,
    remaining: usize,
}

impl Iterator for ChunkIter<'_> {
    type Item = ChunkSlice;

    fn next(&mut self) -> Option<ChunkSlice> {
        if self.remaining == 0 {
            return None;
        }

        let (offset, extent) = self
            .index
            .iter()
            .zip(&self.plan.segments)
            .map(|(&i, segments)| segments[i])
            .unzip();

        self.remaining -= 1;
        for dim in (0..self.index.len()).rev() {
            self.index[dim] += 1;
            if self.index[dim] < self.plan.segments[dim].len() {
                break;
            }
            self.index[dim] = 0;
        }

        Some(ChunkSlice { offset, extent })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ChunkIter<'_> {}

impl FusedIterator for ChunkIter<'_> {}
