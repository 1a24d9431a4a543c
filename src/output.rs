use std::io::{self, Write};

use crate::pipeline::Aggregation;
use crate::stats::Statistics;

/// Writes one `<key>\t<min>\t<mean>\t<max>\t<count>` line.
pub fn write_entry<W: Write>(out: &mut W, key: &[u8], stats: &Statistics) -> io::Result<()> {
    out.write_all(key)?;
    writeln!(
        out,
        "\t{:.1}\t{:.1}\t{:.1}\t{}",
        stats.min_value(),
        stats.mean_value(),
        stats.max_value(),
        stats.count
    )
}

/// Writes every entry, sorted by key.
pub fn write_results<W: Write>(mut out: W, aggregation: &Aggregation) -> io::Result<()> {
    for (key, stats) in aggregation.sorted() {
        write_entry(&mut out, key, stats)?;
    }
    out.flush()
}
