//! Partitioned streaming aggregation of `<key>;<value>` lines.
//!
//! The input is split into line-aligned partitions, each read by several
//! concurrent chunk readers feeding one aggregator; the per-partition tables
//! are merged once every partition has reported.

pub mod boundary;
pub mod chunk;
pub mod config;
pub mod error;
pub mod output;
pub mod parse;
pub mod pipeline;
pub mod scheduler;
pub mod source;
pub mod stats;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{aggregate, Aggregation, PartitionSummary};
pub use source::{FileSource, MmapSource, PositionedRead};
pub use stats::Statistics;
