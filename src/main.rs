use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use partagg::config::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MAX_LINE_LEN, DEFAULT_PARTITIONS, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_SUB_PARTITIONS,
};
use partagg::output::write_results;
use partagg::{aggregate, Aggregation, Config, FileSource, MmapSource};

/// Per-key min/mean/max/count over a `<key>;<value>` file.
#[derive(Parser, Debug)]
struct Args {
    /// Measurements file
    input: PathBuf,
    /// Where to write the results
    #[arg(short, long, default_value = "results.txt")]
    output: PathBuf,
    #[arg(short, long, default_value_t = DEFAULT_PARTITIONS)]
    partitions: usize,
    /// Reader chains per partition
    #[arg(short, long, default_value_t = DEFAULT_SUB_PARTITIONS)]
    sub_partitions: usize,
    /// Bytes per read
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    /// Longest expected line, used when aligning split points
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LEN)]
    max_line_len: usize,
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,
    /// Read through a memory map instead of positioned file reads
    #[arg(long)]
    mmap: bool,
}

impl Args {
    fn config(&self) -> Config {
        Config::default()
            .with_partitions(self.partitions)
            .with_sub_partitions(self.sub_partitions)
            .with_chunk_size(self.chunk_size)
            .with_max_line_len(self.max_line_len)
            .with_queue_capacity(self.queue_capacity)
    }
}

fn run(args: &Args, config: &Config) -> Result<Aggregation> {
    let aggregation = if args.mmap {
        let source = MmapSource::open(&args.input)
            .with_context(|| format!("failed to map {}", args.input.display()))?;
        aggregate(Arc::new(source), config)?
    } else {
        let source = FileSource::open(&args.input)
            .with_context(|| format!("failed to open {}", args.input.display()))?;
        aggregate(Arc::new(source), config)?
    };
    Ok(aggregation)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    let config = args.config();
    let start = Instant::now();

    let aggregation = run(&args, &config)?;

    // only created once aggregation succeeded
    let file = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    write_results(BufWriter::new(file), &aggregation)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    info!(
        keys = aggregation.len(),
        output = %args.output.display(),
        elapsed = ?start.elapsed(),
        "done"
    );
    Ok(())
}
