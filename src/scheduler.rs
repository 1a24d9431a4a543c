//! One partition: sub-range readers fanned into a single aggregating consumer.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, trace};

use crate::boundary::{split_lines, ByteRange};
use crate::chunk::{BufferPool, Chunk, ChunkReader};
use crate::config::Config;
use crate::error::{panic_message, Error, Result};
use crate::source::PositionedRead;
use crate::stats::{PartitionTable, Table};

const TABLE_CAPACITY: usize = 512;

/// Shared stop signal, raised by the first task that fails.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What one partition hands to the merger.
#[derive(Debug)]
pub struct PartitionResult {
    pub index: usize,
    pub range: ByteRange,
    pub table: Table,
    pub lines: u64,
    /// Time the consumer spent blocked on its queue.
    pub wait: Duration,
}

/// Reads and aggregates `range` with `config.sub_partitions` reader threads.
///
/// Returns [`Error::Cancelled`] if `cancel` is raised before the partition is
/// done. Reader threads are joined before this returns, on every path.
pub fn process_partition<S>(
    index: usize,
    range: ByteRange,
    source: &S,
    config: &Config,
    cancel: &CancelFlag,
) -> Result<PartitionResult>
where
    S: PositionedRead + ?Sized,
{
    let sub_ranges = split_lines(source, range, config.sub_partitions, config.max_line_len)?;
    debug!(
        partition = index,
        start = range.start,
        end = range.end,
        sub_ranges = sub_ranges.len(),
        "reading partition"
    );

    let (tx, rx) = bounded::<Result<Chunk>>(config.queue_capacity);
    let pool = BufferPool::new(config.queue_capacity + sub_ranges.len());

    let (table, wait) = thread::scope(|scope| {
        for (i, sub) in sub_ranges.iter().enumerate() {
            let tx = tx.clone();
            let pool = pool.clone();
            let sub = *sub;
            let spawned = thread::Builder::new()
                .name(format!("reader-{index}-{i}"))
                .spawn_scoped(scope, move || {
                    let reader = AssertUnwindSafe(|| {
                        read_sub_range(source, sub, config.chunk_size, pool, tx.clone(), cancel)
                    });
                    if let Err(payload) = catch_unwind(reader) {
                        let _ = tx.send(Err(Error::Panicked(panic_message(payload.as_ref()))));
                    }
                });
            if let Err(e) = spawned {
                // readers already started see the disconnect and stop
                cancel.cancel();
                return Err(Error::from(e));
            }
        }
        drop(tx);
        let result = drain_queue(&rx, sub_ranges.len(), &pool, cancel);
        drop(rx);
        result
    })?;

    Ok(PartitionResult {
        index,
        range,
        lines: table.lines(),
        table: table.into_table(),
        wait,
    })
}

fn read_sub_range<S>(
    source: &S,
    range: ByteRange,
    chunk_size: usize,
    pool: BufferPool,
    tx: Sender<Result<Chunk>>,
    cancel: &CancelFlag,
) where
    S: PositionedRead + ?Sized,
{
    for chunk in ChunkReader::new(source, range, chunk_size).with_pool(pool) {
        if cancel.is_cancelled() {
            return;
        }
        let failed = chunk.is_err();
        if tx.send(chunk).is_err() || failed {
            return;
        }
    }
    trace!(start = range.start, end = range.end, "sub-range exhausted");
}

/// Consumes chunks until every sub-range has sent its empty sentinel.
fn drain_queue(
    rx: &Receiver<Result<Chunk>>,
    sub_ranges: usize,
    pool: &BufferPool,
    cancel: &CancelFlag,
) -> Result<(PartitionTable, Duration)> {
    let mut table = PartitionTable::with_capacity(TABLE_CAPACITY);
    let mut wait = Duration::ZERO;
    let mut finished = 0;
    while finished < sub_ranges {
        let started = Instant::now();
        let received = rx.recv();
        wait += started.elapsed();
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        // readers only hang up early after a cancellation or after sending an error
        let chunk = received.map_err(|_| Error::Cancelled)??;
        if chunk.is_empty() {
            finished += 1;
            continue;
        }
        table.fold_chunk(chunk.bytes(), chunk.offset)?;
        pool.give(chunk.into_buffer());
    }
    Ok((table, wait))
}
