use crate::error::{Error, Result};

pub const DEFAULT_PARTITIONS: usize = 16;
pub const DEFAULT_SUB_PARTITIONS: usize = 2;
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
/// Any station line should reasonably fit in this.
pub const DEFAULT_MAX_LINE_LEN: usize = 200;
pub const DEFAULT_QUEUE_CAPACITY: usize = 30;

/// Sizing and concurrency parameters for one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of top-level partitions, each handled by one pool task.
    pub partitions: usize,
    /// Reader chains per partition.
    pub sub_partitions: usize,
    /// Upper bound on a single positioned read.
    pub chunk_size: usize,
    /// Lookahead used when moving a split point forward to a newline.
    pub max_line_len: usize,
    /// Capacity of each partition's chunk queue.
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            partitions: DEFAULT_PARTITIONS,
            sub_partitions: DEFAULT_SUB_PARTITIONS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_sub_partitions(mut self, sub_partitions: usize) -> Self {
        self.sub_partitions = sub_partitions;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Checks the settings against an input of `file_size` bytes.
    pub fn validate(&self, file_size: u64) -> Result<()> {
        let nonzero = [
            ("partitions", self.partitions),
            ("sub_partitions", self.sub_partitions),
            ("chunk_size", self.chunk_size),
            ("max_line_len", self.max_line_len),
            ("queue_capacity", self.queue_capacity),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(Error::Configuration(format!("{name} must be positive")));
            }
        }
        if self.chunk_size < self.max_line_len {
            return Err(Error::Configuration(format!(
                "chunk_size ({}) is smaller than max_line_len ({})",
                self.chunk_size, self.max_line_len
            )));
        }
        if file_size > 0 && self.partitions as u64 > file_size {
            return Err(Error::Configuration(format!(
                "{} partitions requested for a {file_size} byte input",
                self.partitions
            )));
        }
        Ok(())
    }
}
