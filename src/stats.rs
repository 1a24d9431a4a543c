use ahash::AHashMap;

use crate::error::Result;
use crate::parse::Lines;

/// Owned copy of a key. Chunk buffers are recycled, so tables never borrow.
pub type Key = Box<[u8]>;
pub type Table = AHashMap<Key, Statistics>;

/// Running statistics over scaled (times ten) values. `sum` is widened so
/// adding any number of i64 values cannot overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    pub min: i64,
    pub max: i64,
    pub sum: i128,
    pub count: u64,
}

impl Statistics {
    #[inline]
    pub fn new(value: i64) -> Self {
        Self {
            min: value,
            max: value,
            sum: i128::from(value),
            count: 1,
        }
    }

    #[inline]
    pub fn add(&mut self, value: i64) {
        self.count += 1;
        self.sum += i128::from(value);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Combines two partial results. Associative and commutative.
    #[inline]
    pub fn merge(&mut self, other: &Statistics) {
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn min_value(&self) -> f64 {
        self.min as f64 / 10.0
    }

    pub fn max_value(&self) -> f64 {
        self.max as f64 / 10.0
    }

    /// Unscaled mean, derived from `sum` and `count`.
    pub fn mean_value(&self) -> f64 {
        self.sum as f64 / self.count as f64 / 10.0
    }
}

/// Per-partition table, owned by a single consumer.
#[derive(Debug, Default)]
pub struct PartitionTable {
    table: Table,
    lines: u64,
}

impl PartitionTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: Table::with_capacity(capacity),
            lines: 0,
        }
    }

    #[inline]
    pub fn record(&mut self, key: &[u8], value: i64) {
        match self.table.get_mut(key) {
            Some(stats) => stats.add(value),
            None => {
                self.table.insert(key.into(), Statistics::new(value));
            }
        }
        self.lines += 1;
    }

    /// Folds every line of `bytes` (starting at input offset `base`).
    pub fn fold_chunk(&mut self, bytes: &[u8], base: u64) -> Result<()> {
        for reading in Lines::new(bytes, base) {
            let reading = reading?;
            self.record(reading.key, reading.value);
        }
        Ok(())
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn get(&self, key: &[u8]) -> Option<&Statistics> {
        self.table.get(key)
    }

    pub fn into_table(self) -> Table {
        self.table
    }
}

pub fn merge_maps(mut global: Table, local: Table) -> Table {
    for (key, stats) in local {
        global
            .entry(key)
            .and_modify(|g| g.merge(&stats))
            .or_insert(stats);
    }
    global
}
