use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{ChunkPlan, ChunkSlice, StreamError};

/// Cooperative cancellation flag checked between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Chunk writes in progress are not interrupted.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Something that can produce the payload of any chunk of a dataset.
pub trait ChunkSource {
    /// Bytes per element.
    fn element_size(&self) -> usize;

    /// Full dataset shape.
    fn shape(&self) -> &[u64];

    /// Append the row-major bytes of `slice` to `buf`.
    fn read_chunk(&mut self, slice: &ChunkSlice, buf: &mut Vec<u8>) -> io::Result<()>;
}

/// Something that accepts chunk payloads at declared offsets.
pub trait ChunkSink {
    /// Error raised by a failed write
    type Error: std::error::Error + Send + Sync + 'static;

    /// Write the row-major bytes of `slice`.
    fn write_chunk(&mut self, slice: &ChunkSlice, data: &[u8]) -> Result<(), Self::Error>;
}

/// Statistics from a completed stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Number of chunks written
    pub chunks_written: usize,
    /// Payload bytes written
    pub bytes_written: u64,
    /// Largest buffer held at once, in bytes
    pub peak_buffer_bytes: usize,
}

/// Pull every chunk of `plan` from `source` and push it into `sink`.
///
/// One buffer is reused across chunks. `cancel` is checked before each chunk;
/// after cancellation the sink holds exactly the chunks already written.
pub fn stream_chunks<S, K>(
    plan: &ChunkPlan,
    source: &mut S,
    sink: &mut K,
    cancel: &CancellationToken,
) -> Result<StreamStats, StreamError>
where
    S: ChunkSource + ?Sized,
    K: ChunkSink + ?Sized,
{
    let element_size = source.element_size();
    let mut buf = Vec::with_capacity(plan.buffer_bytes(element_size));
    let mut stats = StreamStats::default();

    for slice in plan.iter() {
        if cancel.is_cancelled() {
            log::info!("cancelled after {} chunks", stats.chunks_written);
            return Err(StreamError::Cancelled {
                chunks_written: stats.chunks_written,
            });
        }

        buf.clear();
        source
            .read_chunk(&slice, &mut buf)
            .map_err(|source| StreamError::Read {
                offset: slice.offset.clone(),
                source,
            })?;

        let expected = slice.byte_len(element_size);
        if buf.len() != expected {
            return Err(StreamError::ShortRead {
                offset: slice.offset,
                expected,
                found: buf.len(),
            });
        }

        sink.write_chunk(&slice, &buf)
            .map_err(|e| StreamError::Sink(Box::new(e)))?;

        stats.chunks_written += 1;
        stats.bytes_written += buf.len() as u64;
        stats.peak_buffer_bytes = stats.peak_buffer_bytes.max(buf.len());
        log::debug!("wrote chunk {:?} ({} bytes)", slice.offset, buf.len());
    }

    Ok(stats)
}
