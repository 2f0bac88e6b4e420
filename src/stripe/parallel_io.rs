//! Parallel I/O Engine
//!
//! Splits a byte range of an open file into stripe-confined chunks and
//! transfers them concurrently with positional I/O.
//!
//! # Guarantees
//!
//! - Concurrency is bounded by `min(max_parallelism, stripe_count)`.
//! - Chunk results are placed by chunk index, so output order never depends
//!   on completion order.
//! - Any chunk failure fails the whole call; the reported error is the one
//!   with the lowest chunk index. No partial buffer is returned.
//! - Cancelling the token, or dropping the future, aborts the outstanding
//!   chunk tasks of that call only.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::planner::{decompose_range, StripeChunk, StripeDescriptor};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
enum Direction {
    Read,
    Write,
}

impl Direction {
    fn chunk_error(self, chunk_index: usize, offset: u64, source: io::Error) -> Error {
        match self {
            Direction::Read => Error::ChunkReadFailed {
                chunk_index,
                offset,
                source,
            },
            Direction::Write => Error::ChunkWriteFailed {
                chunk_index,
                offset,
                source,
            },
        }
    }
}

/// Stripe-parallel positional reader/writer.
#[derive(Debug, Clone)]
pub struct ParallelIo {
    max_parallelism: usize,
}

impl Default for ParallelIo {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ParallelIo {
    /// `max_parallelism == 0` uses the number of available CPUs.
    pub fn new(max_parallelism: usize) -> Self {
        let max_parallelism = if max_parallelism > 0 {
            max_parallelism
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        };
        Self { max_parallelism }
    }

    /// Concurrent chunk transfers allowed for a layout.
    pub fn concurrency_for(&self, descriptor: &StripeDescriptor) -> usize {
        self.max_parallelism
            .min(descriptor.stripe_count as usize)
            .max(1)
    }

    fn plan(&self, offset: u64, length: u64, descriptor: &StripeDescriptor) -> Result<(Vec<StripeChunk>, usize)> {
        if descriptor.is_parallel() {
            Ok((decompose_range(offset, length, descriptor)?, self.concurrency_for(descriptor)))
        } else {
            let single = StripeChunk {
                offset,
                len: length,
                stripe_index: 0,
            };
            Ok((vec![single], 1))
        }
    }

    /// Read `length` bytes at `offset`.
    #[instrument(skip(self, file, cancel), fields(stripes = descriptor.stripe_count))]
    pub async fn read(
        &self,
        file: Arc<File>,
        offset: u64,
        length: u64,
        descriptor: &StripeDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        let capacity = usize::try_from(length)
            .map_err(|_| Error::InvalidStripeLayout(format!("read length {} too large", length)))?;

        let (chunks, concurrency) = self.plan(offset, length, descriptor)?;
        debug!(chunks = chunks.len(), concurrency, "Parallel read");

        let buffers = run_chunks(chunks, concurrency, Direction::Read, cancel, move |chunk| {
            let mut buf = vec![0u8; chunk.len as usize];
            file.read_exact_at(&mut buf, chunk.offset)?;
            Ok(buf)
        })
        .await?;

        let mut out = BytesMut::with_capacity(capacity);
        for buf in buffers {
            out.extend_from_slice(&buf);
        }
        Ok(out.freeze())
    }

    /// Write `data` at `offset`.
    #[instrument(skip(self, file, data, cancel), fields(len = data.len(), stripes = descriptor.stripe_count))]
    pub async fn write(
        &self,
        file: Arc<File>,
        offset: u64,
        data: Bytes,
        descriptor: &StripeDescriptor,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let (chunks, concurrency) = self.plan(offset, data.len() as u64, descriptor)?;
        debug!(chunks = chunks.len(), concurrency, "Parallel write");

        run_chunks(chunks, concurrency, Direction::Write, cancel, move |chunk| {
            let start = (chunk.offset - offset) as usize;
            let end = start + chunk.len as usize;
            file.write_all_at(&data[start..end], chunk.offset)
        })
        .await?;
        Ok(())
    }
}

async fn run_chunks<T, F>(
    chunks: Vec<StripeChunk>,
    concurrency: usize,
    direction: Direction,
    cancel: &CancellationToken,
    op: F,
) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: Fn(StripeChunk) -> io::Result<T> + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();

    for (index, chunk) in chunks.iter().copied().enumerate() {
        let op = Arc::clone(&op);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return (index, Err(io::Error::new(io::ErrorKind::Other, e))),
            };
            let result = match tokio::task::spawn_blocking(move || op(chunk)).await {
                Ok(result) => result,
                Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
            };
            (index, result)
        });
    }

    let mut slots: Vec<Option<T>> = (0..chunks.len()).map(|_| None).collect();
    let mut failures: Vec<(usize, io::Error)> = Vec::new();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tasks.abort_all();
                debug!("Parallel transfer cancelled");
                return Err(Error::Cancelled);
            }
            joined = tasks.join_next() => match joined {
                None => break,
                Some(Ok((index, Ok(value)))) => slots[index] = Some(value),
                Some(Ok((index, Err(e)))) => failures.push((index, e)),
                Some(Err(e)) => return Err(Error::Internal(format!("chunk task failed: {}", e))),
            },
        }
    }

    if let Some((index, source)) = failures.into_iter().min_by_key(|(index, _)| *index) {
        return Err(direction.chunk_error(index, chunks[index].offset, source));
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.ok_or_else(|| Error::Internal(format!("chunk {} produced no result", index))))
        .collect()
}
