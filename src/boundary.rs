//! Line-aligned splitting of the input.

use std::sync::Arc;

use memchr::{memchr, memrchr};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::source::PositionedRead;

/// Half-open byte range `[start, end)`. `end` is either the end of the input
/// or the offset just past a newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Returns the offset just past the first newline at or after `from`, looking
/// at most `window` bytes ahead and never past `limit`.
///
/// Hitting `limit` without a newline is fine (the rest belongs to the last
/// line); a full window without one is a [`Error::BoundaryScan`].
pub fn next_line_start<S>(source: &S, from: u64, limit: u64, window: usize) -> Result<u64>
where
    S: PositionedRead + ?Sized,
{
    if from >= limit {
        return Ok(limit);
    }
    let want = window.min((limit - from).min(usize::MAX as u64) as usize);
    let mut buf = vec![0u8; want];
    let read = source.read_at(&mut buf, from).map_err(|e| Error::Read {
        offset: from,
        source: Arc::new(e),
    })?;
    if read < want {
        return Err(Error::ShortRead {
            offset: from,
            expected: want,
            actual: read,
        });
    }
    match memchr(b'\n', &buf) {
        Some(pos) => Ok(from + pos as u64 + 1),
        None if from + want as u64 >= limit => Ok(limit),
        None => Err(Error::BoundaryScan {
            offset: from,
            window,
        }),
    }
}

/// Length of the longest prefix of `buf` that ends in a newline.
pub fn complete_lines_len(buf: &[u8]) -> Option<usize> {
    memrchr(b'\n', buf).map(|pos| pos + 1)
}

/// Splits `range` into `parts` contiguous line-aligned ranges. Some of them
/// may be empty when `range` holds fewer lines than `parts`.
pub fn split_lines<S>(source: &S, range: ByteRange, parts: usize, window: usize) -> Result<Vec<ByteRange>>
where
    S: PositionedRead + ?Sized,
{
    if parts == 0 {
        return Err(Error::Configuration("cannot split into zero parts".into()));
    }
    let len = range.len() as u128;
    let mut ranges = Vec::with_capacity(parts);
    let mut start = range.start;
    for i in 1..parts {
        let naive = range.start + (len * i as u128 / parts as u128) as u64;
        let end = next_line_start(source, naive.max(start), range.end, window)?;
        ranges.push(ByteRange::new(start, end));
        start = end;
    }
    ranges.push(ByteRange::new(start, range.end));
    Ok(ranges)
}

/// Splits the whole input into `config.partitions` ranges.
pub fn partition<S>(source: &S, config: &Config) -> Result<Vec<ByteRange>>
where
    S: PositionedRead + ?Sized,
{
    let size = source.len();
    config.validate(size)?;
    split_lines(
        source,
        ByteRange::new(0, size),
        config.partitions,
        config.max_line_len,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut data = Vec::new();
        for i in 0..200 {
            data.extend_from_slice(format!("station{};{}.{}\n", i % 17, i, i % 10).as_bytes());
        }
        data
    }

    fn assert_aligned(data: &[u8], whole: ByteRange, ranges: &[ByteRange]) {
        assert_eq!(ranges.first().map(|r| r.start), Some(whole.start));
        assert_eq!(ranges.last().map(|r| r.end), Some(whole.end));
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        for r in ranges {
            if r.end != whole.end && r.end > 0 {
                assert_eq!(data[r.end as usize - 1], b'\n', "range {r:?} ends mid-line");
            }
        }
    }

    #[test]
    fn partitions_cover_input_on_line_boundaries() {
        let data = sample();
        let whole = ByteRange::new(0, data.len() as u64);
        for parts in 1..=40 {
            let config = Config::default().with_partitions(parts);
            let ranges = partition(&data, &config).unwrap();
            assert_eq!(ranges.len(), parts);
            assert_aligned(&data, whole, &ranges);
        }
    }

    #[test]
    fn sub_ranges_stay_inside_parent() {
        let data = sample();
        let parent = split_lines(&data, ByteRange::new(0, data.len() as u64), 3, 200).unwrap()[1];
        for parts in 1..=9 {
            let ranges = split_lines(&data, parent, parts, 200).unwrap();
            assert_aligned(&data, parent, &ranges);
        }
    }

    #[test]
    fn more_parts_than_lines_gives_empty_ranges() {
        let data = b"A;1.0\nB;2.0\n".to_vec();
        let ranges = split_lines(&data, ByteRange::new(0, 12), 8, 200).unwrap();
        assert_eq!(ranges.len(), 8);
        assert_eq!(ranges.iter().filter(|r| !r.is_empty()).count(), 2);
        assert_aligned(&data, ByteRange::new(0, 12), &ranges);
    }

    #[test]
    fn unterminated_last_line_ends_at_limit() {
        let data = b"A;1.0\nB;2.0".to_vec();
        assert_eq!(next_line_start(&data, 7, 11, 200).unwrap(), 11);
    }

    #[test]
    fn overlong_line_is_reported() {
        let mut data = vec![b'x'; 64];
        data.extend_from_slice(b";1.0\n");
        let err = next_line_start(&data, 2, data.len() as u64, 16).unwrap_err();
        assert!(matches!(err, Error::BoundaryScan { offset: 2, window: 16 }));
    }

    #[test]
    fn complete_lines_trims_partial_tail() {
        assert_eq!(complete_lines_len(b"a;1.0\nb;2"), Some(6));
        assert_eq!(complete_lines_len(b"a;1.0"), None);
    }
}
