//! Orchestration: partition pool, join, cancellation and the global merge.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info, warn};

use crate::boundary::{partition, ByteRange};
use crate::config::Config;
use crate::error::{panic_message, Error, Result};
use crate::scheduler::{process_partition, CancelFlag, PartitionResult};
use crate::source::PositionedRead;
use crate::stats::{merge_maps, Statistics, Table};

/// Bookkeeping kept per partition after its table is merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub index: usize,
    pub range: ByteRange,
    pub lines: u64,
    pub wait: Duration,
}

/// Final key to statistics mapping.
#[derive(Debug, Default)]
pub struct Aggregation {
    table: Table,
    partitions: Vec<PartitionSummary>,
}

impl Aggregation {
    pub fn get(&self, key: &[u8]) -> Option<&Statistics> {
        self.table.get(key)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Per-partition line counts and queue wait, ordered by partition index.
    pub fn partitions(&self) -> &[PartitionSummary] {
        &self.partitions
    }

    pub fn total_lines(&self) -> u64 {
        self.partitions.iter().map(|p| p.lines).sum()
    }

    /// Entries ordered by key bytes.
    pub fn sorted(&self) -> Vec<(&[u8], &Statistics)> {
        let mut entries: Vec<_> = self.table.iter().map(|(k, v)| (&**k, v)).collect();
        entries.par_sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

/// Aggregates the whole of `source`.
///
/// Partitions run on a pool of `config.partitions` threads. The first failing
/// partition cancels the rest; its error comes back as [`Error::Partition`]
/// once every task has reported.
pub fn aggregate<S>(source: Arc<S>, config: &Config) -> Result<Aggregation>
where
    S: PositionedRead + 'static,
{
    let started = Instant::now();
    let ranges = partition(source.as_ref(), config)?;
    info!(
        bytes = source.len(),
        partitions = ranges.len(),
        sub_partitions = config.sub_partitions,
        chunk_size = config.chunk_size,
        "starting aggregation"
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(ranges.len())
        .thread_name(|i| format!("partition-{i}"))
        .build()
        .map_err(|e| Error::Configuration(format!("cannot start partition pool: {e}")))?;

    let (tx, rx) = bounded::<(usize, Result<PartitionResult>)>(ranges.len());
    let cancel = CancelFlag::new();
    for (index, range) in ranges.iter().copied().enumerate() {
        let source = Arc::clone(&source);
        let config = config.clone();
        let cancel = cancel.clone();
        let tx = tx.clone();
        pool.spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(|| {
                process_partition(index, range, source.as_ref(), &config, &cancel)
            }))
            .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(payload.as_ref()))));
            if let Err(e) = &result {
                if !e.is_cancelled() {
                    warn!(partition = index, error = %e, "partition failed, cancelling the rest");
                    cancel.cancel();
                }
            }
            let _ = tx.send((index, result));
        });
    }
    drop(tx);

    let mut results = Vec::with_capacity(ranges.len());
    let mut failure = None;
    for (index, result) in rx.iter() {
        match result {
            Ok(result) => results.push(result),
            Err(e) => {
                cancel.cancel();
                if failure.is_none() && !e.is_cancelled() {
                    failure = Some(Error::Partition {
                        index,
                        source: Box::new(e),
                    });
                }
            }
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }
    if results.len() != ranges.len() {
        let index = (0..ranges.len())
            .find(|i| !results.iter().any(|r| r.index == *i))
            .unwrap_or_default();
        return Err(Error::Partition {
            index,
            source: Box::new(Error::Panicked("exited without reporting a result".into())),
        });
    }

    let aggregation = merge_results(results);
    info!(
        keys = aggregation.len(),
        lines = aggregation.total_lines(),
        elapsed = ?started.elapsed(),
        "aggregation finished"
    );
    Ok(aggregation)
}

/// Sequential global merge of every partition's table.
pub fn merge_results(results: Vec<PartitionResult>) -> Aggregation {
    let mut table = Table::new();
    let mut partitions = Vec::with_capacity(results.len());
    for result in results {
        debug!(
            partition = result.index,
            lines = result.lines,
            io_wait = ?result.wait,
            "merging partition"
        );
        partitions.push(PartitionSummary {
            index: result.index,
            range: result.range,
            lines: result.lines,
            wait: result.wait,
        });
        table = merge_maps(table, result.table);
    }
    partitions.sort_by_key(|p| p.index);
    Aggregation { table, partitions }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(data: &[u8], config: &Config) -> Result<Aggregation> {
        aggregate(Arc::new(data.to_vec()), config)
    }

    fn config(partitions: usize, subs: usize) -> Config {
        Config::default()
            .with_partitions(partitions)
            .with_sub_partitions(subs)
            .with_chunk_size(32)
            .with_max_line_len(32)
            .with_queue_capacity(2)
    }

    #[test]
    fn small_file_any_configuration() {
        let data = b"A;10.0\nB;-5.5\nA;20.0\n";
        for partitions in 1..=8 {
            for subs in 1..=4 {
                let result = run(data, &config(partitions, subs)).unwrap();
                let a = result.get(b"A").unwrap();
                assert_eq!((a.min, a.max, a.count), (100, 200, 2));
                assert_eq!(a.mean_value(), 15.0);
                let b = result.get(b"B").unwrap();
                assert_eq!((b.min, b.max, b.count), (-55, -55, 1));
                assert_eq!(b.mean_value(), -5.5);
                assert_eq!(result.len(), 2);
                assert_eq!(result.total_lines(), 3);
            }
        }
    }

    #[test]
    fn line_counts_add_up() {
        let mut data = Vec::new();
        for i in 0..1000 {
            data.extend_from_slice(format!("s{:03};{}.{}\n", i % 97, i % 50, i % 10).as_bytes());
        }
        for (partitions, subs) in [(1, 1), (3, 2), (8, 3), (16, 5)] {
            let result = run(&data, &config(partitions, subs)).unwrap();
            assert_eq!(result.partitions().len(), partitions);
            assert_eq!(result.total_lines(), 1000);
            let counted: u64 = result.table().values().map(|s| s.count).sum();
            assert_eq!(counted, 1000);
        }
    }

    #[test]
    fn values_stay_within_min_max() {
        let mut data = Vec::new();
        let mut expected: Vec<(String, i64)> = Vec::new();
        for i in 0..600i64 {
            let key = format!("k{}", i % 13);
            let value = (i * 37 % 401) - 200;
            let sign = if value < 0 { "-" } else { "" };
            data.extend_from_slice(format!("{key};{sign}{}.{}\n", value.abs() / 10, value.abs() % 10).as_bytes());
            expected.push((key, value));
        }
        let result = run(&data, &config(4, 3)).unwrap();
        for (key, value) in &expected {
            let stats = result.get(key.as_bytes()).unwrap();
            assert!(stats.min <= *value && *value <= stats.max);
        }
        for (key, stats) in result.sorted() {
            let n = expected.iter().filter(|(k, _)| k.as_bytes() == key).count() as u64;
            assert_eq!(stats.count, n);
        }
    }

    #[test]
    fn failure_is_surfaced_once() {
        let mut data = Vec::new();
        for i in 0..400 {
            data.extend_from_slice(format!("ok{};1.{}\n", i % 5, i % 10).as_bytes());
        }
        data.extend_from_slice(b"bad;1.23\n");
        for i in 0..400 {
            data.extend_from_slice(format!("ok{};2.{}\n", i % 5, i % 10).as_bytes());
        }
        let err = run(&data, &config(6, 2)).unwrap_err();
        match err {
            Error::Partition { source, .. } => assert!(matches!(*source, Error::Parse { .. })),
            other => panic!("unexpected {other}"),
        }
    }

    struct Exploding;

    impl PositionedRead for Exploding {
        fn len(&self) -> u64 {
            64
        }

        fn read_at(&self, _buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
            panic!("device vanished at {offset}");
        }
    }

    #[test]
    fn panicking_reader_is_reported_as_panic() {
        let config = Config::default().with_partitions(1).with_sub_partitions(1);
        let err = aggregate(Arc::new(Exploding), &config).unwrap_err();
        match err {
            Error::Partition { index: 0, source } => match *source {
                Error::Panicked(msg) => assert!(msg.contains("device vanished"), "got {msg}"),
                other => panic!("unexpected {other}"),
            },
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn zero_partitions_is_a_configuration_error() {
        let err = run(b"A;1.0\n", &config(0, 1)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn empty_input_gives_empty_result() {
        let result = run(b"", &config(2, 2)).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.total_lines(), 0);
    }
}
