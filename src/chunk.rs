//! Bounded, newline-trimmed reads over one sub-range.

use std::iter::FusedIterator;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::boundary::{complete_lines_len, ByteRange};
use crate::error::{Error, Result};
use crate::source::PositionedRead;

/// A buffer holding whole lines only. An empty chunk marks the end of its
/// sub-range.
#[derive(Debug)]
pub struct Chunk {
    /// Offset of the first byte of `data` in the input.
    pub offset: u64,
    /// Where the following read of the same sub-range starts.
    pub next_offset: u64,
    data: Vec<u8>,
}

impl Chunk {
    fn exhausted(offset: u64) -> Self {
        Self {
            offset,
            next_offset: offset,
            data: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Gives the backing buffer back, e.g. to a [`BufferPool`].
    pub fn into_buffer(self) -> Vec<u8> {
        self.data
    }
}

/// Recycles chunk buffers from the consumer back to the readers.
#[derive(Debug, Clone)]
pub struct BufferPool {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    pub fn take(&self) -> Vec<u8> {
        self.rx.try_recv().unwrap_or_default()
    }

    /// Returns a buffer; dropped if the pool is already full.
    pub fn give(&self, mut buf: Vec<u8>) {
        buf.clear();
        let _ = self.tx.try_send(buf);
    }
}

/// Lazy sequence of [`Chunk`]s over one sub-range, ending with exactly one
/// empty chunk. Fused after that sentinel or after the first error.
pub struct ChunkReader<'a, S: ?Sized> {
    source: &'a S,
    offset: u64,
    end: u64,
    chunk_size: usize,
    pool: Option<BufferPool>,
    done: bool,
}

impl<'a, S> ChunkReader<'a, S>
where
    S: PositionedRead + ?Sized,
{
    pub fn new(source: &'a S, range: ByteRange, chunk_size: usize) -> Self {
        Self {
            source,
            offset: range.start,
            end: range.end,
            chunk_size: chunk_size.max(1),
            pool: None,
            done: false,
        }
    }

    pub fn with_pool(mut self, pool: BufferPool) -> Self {
        self.pool = Some(pool);
        self
    }

    fn buffer(&self) -> Vec<u8> {
        self.pool.as_ref().map(BufferPool::take).unwrap_or_default()
    }

    fn read_next(&mut self) -> Result<Chunk> {
        let remaining = self.end - self.offset;
        let want = (self.chunk_size as u64).min(remaining) as usize;
        let mut buf = self.buffer();
        buf.resize(want, 0);

        let read = self.source.read_at(&mut buf, self.offset).map_err(|e| Error::Read {
            offset: self.offset,
            source: Arc::new(e),
        })?;
        if read < want {
            return Err(Error::ShortRead {
                offset: self.offset,
                expected: want,
                actual: read,
            });
        }

        // a read that reaches the range end keeps everything: the range ends on
        // a line boundary, or at EOF after an unterminated last line
        let keep = if want as u64 == remaining {
            want
        } else {
            complete_lines_len(&buf).ok_or(Error::BoundaryScan {
                offset: self.offset,
                window: want,
            })?
        };
        buf.truncate(keep);

        let chunk = Chunk {
            offset: self.offset,
            next_offset: self.offset + keep as u64,
            data: buf,
        };
        self.offset = chunk.next_offset;
        Ok(chunk)
    }
}

impl<S> Iterator for ChunkReader<'_, S>
where
    S: PositionedRead + ?Sized,
{
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.offset >= self.end {
            self.done = true;
            return Some(Ok(Chunk::exhausted(self.offset)));
        }
        let item = self.read_next();
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}

impl<S> FusedIterator for ChunkReader<'_, S> where S: PositionedRead + ?Sized {}
