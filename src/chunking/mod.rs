//! # Chunking Module
//!
//! Bounded-memory iteration over N-dimensional array datasets.
//!
//! A [`ChunkConfig`] describes a dataset (shape and element size), a memory
//! budget and an optional preferred physical chunk shape. [`ChunkConfig::plan`]
//! turns it into a [`ChunkPlan`]: a verified partition of the index space into
//! iteration buffers, each no larger than the budget. Adapters hand the plan
//! to [`stream_chunks`], which pulls one buffer at a time from a
//! [`ChunkSource`] and pushes it into a [`ChunkSink`].
//!
//! ## Buffer shape selection
//!
//! Dimensions are filled from the last (fastest-varying) to the first: every
//! trailing dimension is kept whole while it fits, the first dimension that
//! does not fit entirely gets as many rows as the budget allows, rounded down
//! to a multiple of the physical chunk extent and, when one is close enough,
//! to a divisor of the dataset extent so the dimension splits evenly. The
//! last tile along each dimension is clipped at the boundary.
//!
//! ```rust
//! use confluence::chunking::ChunkConfig;
//!
//! let plan = ChunkConfig::new(vec![10_000, 64], 4)
//!     .with_buffer_bytes(1000 * 64 * 4)
//!     .plan()?;
//!
//! assert_eq!(plan.buffer_shape(), &[1000, 64]);
//! assert_eq!(plan.len(), 10);
//! let offsets: Vec<_> = plan.iter().map(|c| c.offset[0]).collect();
//! assert_eq!(offsets[..3], [0, 1000, 2000]);
//! # Ok::<(), confluence::chunking::ChunkError>(())
//! ```

mod error;
mod plan;
mod stream;


pub use error::{ChunkError, StreamError};
pub use plan::{ChunkIter, ChunkPlan, ChunkSlice};
pub use stream::{stream_chunks, CancellationToken, ChunkSink, ChunkSource, StreamStats};

/// Budget for one physical chunk when no chunk shape is given (10 MiB).
pub const DEFAULT_CHUNK_BYTES: u64 = 10 * 1024 * 1024;

/// Default iteration buffer budget (1 GiB).
pub const DEFAULT_BUFFER_BYTES: u64 = 1024 * 1024 * 1024;

/// Leading-dimension bound applied in stub mode.
pub const STUB_LEADING_EXTENT: u64 = 100;

/// Configuration of a chunked traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Dataset extent along each dimension
    pub shape: Vec<u64>,
    /// Bytes per element
    pub element_size: usize,
    /// Maximum bytes held by one iteration buffer
    pub buffer_bytes: u64,
    /// Preferred physical chunk shape of the output dataset
    pub chunk_shape: Option<Vec<u64>>,
    /// Leading-dimension bound for stub mode
    pub stub: Option<u64>,
}

impl ChunkConfig {
    /// Configuration with the default buffer budget and automatic chunking.
    pub fn new(shape: Vec<u64>, element_size: usize) -> Self {
        Self {
            shape,
            element_size,
            buffer_bytes: DEFAULT_BUFFER_BYTES,
            chunk_shape: None,
            stub: None,
        }
    }

    /// Set the iteration buffer budget.
    pub fn with_buffer_bytes(mut self, bytes: u64) -> Self {
        self.buffer_bytes = bytes;
        self
    }

    /// Set the preferred physical chunk shape.
    pub fn with_chunk_shape(mut self, chunk_shape: Vec<u64>) -> Self {
        self.chunk_shape = Some(chunk_shape);
        self
    }

    /// Truncate the leading dimension to `bound` entries.
    pub fn with_stub(mut self, bound: u64) -> Self {
        self.stub = Some(bound);
        self
    }

    fn check(&self) -> Result<(), ChunkError> {
        if self.shape.is_empty() {
            return Err(ChunkError::EmptyShape);
        }
        if self.element_size == 0 {
            return Err(ChunkError::ZeroElementSize);
        }
        if let Some(dim) = self.shape.iter().position(|&e| e == 0) {
            return Err(ChunkError::ZeroExtent {
                name: "dataset",
                dim,
            });
        }
        if let Some(chunk) = &self.chunk_shape {
            if chunk.len() != self.shape.len() {
                return Err(ChunkError::RankMismatch {
                    expected: self.shape.len(),
                    found: chunk.len(),
                });
            }
            if let Some(dim) = chunk.iter().position(|&e| e == 0) {
                return Err(ChunkError::ZeroExtent { name: "chunk", dim });
            }
        }
        Ok(())
    }

    /// Physical chunk shape: the preferred shape clipped to the dataset, or
    /// one fitted to [`DEFAULT_CHUNK_BYTES`] (never above the buffer budget).
    pub fn physical_chunk_shape(&self) -> Result<Vec<u64>, ChunkError> {
        self.check()?;
        match &self.chunk_shape {
            Some(chunk) => Ok(chunk
                .iter()
                .zip(&self.shape)
                .map(|(&c, &e)| c.min(e))
                .collect()),
            None => fit_shape(
                &self.shape,
                self.element_size,
                DEFAULT_CHUNK_BYTES.min(self.buffer_bytes),
                None,
            ),
        }
    }

    /// Compute the verified chunk plan.
    ///
    /// In stub mode the buffer shape is computed for the full dataset and then
    /// clipped to the truncated space, so a stub plan never has more chunks
    /// than the full one.
    pub fn plan(&self) -> Result<ChunkPlan, ChunkError> {
        let physical = self.physical_chunk_shape()?;
        let mut buffer = fit_shape(
            &self.shape,
            self.element_size,
            self.buffer_bytes,
            Some(&physical),
        )?;

        let mut shape = self.shape.clone();
        if let Some(bound) = self.stub {
            shape[0] = shape[0].min(bound.max(1));
            buffer[0] = buffer[0].min(shape[0]);
        }

        let plan = ChunkPlan::new(shape, buffer, physical)?;
        log::debug!(
            "chunk plan: shape {:?}, buffer {:?}, physical {:?}, {} chunks",
            plan.shape(),
            plan.buffer_shape(),
            plan.chunk_shape(),
            plan.len()
        );
        Ok(plan)
    }
}

/// Fit a box into `budget` bytes, keeping trailing dimensions whole.
///
/// With `align`, the partial dimension is rounded down to a multiple of the
/// aligned extent when at least one multiple fits.
pub fn fit_shape(
    shape: &[u64],
    element_size: usize,
    budget: u64,
    align: Option<&[u64]>,
) -> Result<Vec<u64>, ChunkError> {
    let mut out = shape.to_vec();
    for dim in 0..shape.len() {
        let trailing: u128 = element_size as u128
            * shape[dim + 1..].iter().map(|&e| e as u128).product::<u128>();
        if trailing > budget as u128 {
            if dim + 1 == shape.len() {
                return Err(ChunkError::BudgetTooSmall {
                    budget,
                    required: element_size as u64,
                });
            }
            out[dim] = 1;
            continue;
        }

        let extent = shape[dim];
        let fits = (budget as u128 / trailing).min(extent as u128) as u64;
        if fits >= extent {
            break;
        }

        let step = align.map_or(1, |a| a[dim].max(1));
        let fits = if step <= fits { fits - fits % step } else { fits };
        out[dim] = even_divisor(extent, fits, step).unwrap_or(fits);
        break;
    }
    Ok(out)
}

/// Largest divisor `m` of `extent` that is a multiple of `step` with
/// `limit / 2 <= m <= limit`.
fn even_divisor(extent: u64, limit: u64, step: u64) -> Option<u64> {
    let mut best: Option<u64> = None;
    let mut consider = |m: u64| {
        if m <= limit && m % step == 0 && 2 * m >= limit && best.map_or(true, |b| m > b) {
            best = Some(m);
        }
    };
    let mut d = 1u64;
    while d.saturating_mul(d) <= extent {
        if extent % d == 0 {
            consider(d);
            consider(extent / d);
        }
        d += 1;
    }
    best
}
