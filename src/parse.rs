//! In-place parsing of `<key>;<signedDecimal>` lines.
//!
//! Values carry exactly one fractional digit and are kept as integers scaled
//! by ten, so no float parsing and no allocation happens here. Keys are
//! returned as slices of the chunk; whoever stores them must copy.

use memchr::memchr;

use crate::error::{Error, Result};

/// One parsed line, borrowing its key from the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading<'a> {
    pub key: &'a [u8],
    /// Value times ten.
    pub value: i64,
}

/// Parses `-?[0-9]+\.[0-9]` into the value times ten.
pub fn parse_scaled(field: &[u8]) -> std::result::Result<i64, &'static str> {
    let (negative, digits) = match field.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, field),
    };
    let mut value: i64 = 0;
    let mut dot = None;
    for (i, &b) in digits.iter().enumerate() {
        match b {
            b'0'..=b'9' => {
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(i64::from(b - b'0')))
                    .ok_or("value out of range")?;
            }
            b'.' if dot.is_none() => dot = Some(i),
            _ => return Err("unexpected byte in value"),
        }
    }
    match dot {
        Some(i) if i > 0 && i + 2 == digits.len() => Ok(if negative { -value } else { value }),
        _ => Err("value must have exactly one fractional digit"),
    }
}

/// Iterator over the lines of a chunk. The last line may omit its newline.
/// Stops after the first malformed line.
pub struct Lines<'a> {
    buf: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> Lines<'a> {
    /// `base` is the input offset of `buf[0]`, used in error reports.
    pub fn new(buf: &'a [u8], base: u64) -> Self {
        Self { buf, pos: 0, base }
    }

    fn parse_line(line: &'a [u8], offset: u64) -> Result<Reading<'a>> {
        let semi = memchr(b';', line).ok_or_else(|| Error::parse(offset, "missing ';'"))?;
        if semi == 0 {
            return Err(Error::parse(offset, "empty key"));
        }
        let value = parse_scaled(&line[semi + 1..]).map_err(|reason| Error::parse(offset, reason))?;
        Ok(Reading {
            key: &line[..semi],
            value,
        })
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = Result<Reading<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let rest = &self.buf[self.pos..];
        let len = memchr(b'\n', rest).unwrap_or(rest.len());
        let offset = self.base + self.pos as u64;
        self.pos += len + 1;

        let item = Self::parse_line(&rest[..len], offset);
        if item.is_err() {
            self.pos = self.buf.len();
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_values() {
        assert_eq!(parse_scaled(b"-3.2"), Ok(-32));
        assert_eq!(parse_scaled(b"0.0"), Ok(0));
        assert_eq!(parse_scaled(b"15.7"), Ok(157));
        assert_eq!(parse_scaled(b"-99.9"), Ok(-999));
        assert_eq!(parse_scaled(b"-0.0"), Ok(0));
    }

    #[test]
    fn malformed_values() {
        for bad in [&b""[..], b"-", b"1", b"1.", b".5", b"1.23", b"1.2.3", b"1,2", b"+1.0", b"12a.0"] {
            assert!(parse_scaled(bad).is_err(), "{:?} parsed", String::from_utf8_lossy(bad));
        }
    }

    #[test]
    fn lines_borrow_keys_from_buffer() {
        let buf = b"Hamburg;12.0\nSt. John's;-3.4\nHamburg;8.9\n";
        let readings: Vec<_> = Lines::new(buf, 0).collect::<Result<_>>().unwrap();
        assert_eq!(
            readings,
            vec![
                Reading { key: b"Hamburg", value: 120 },
                Reading { key: b"St. John's", value: -34 },
                Reading { key: b"Hamburg", value: 89 },
            ]
        );
        assert_eq!(readings[1].key.as_ptr(), buf[13..].as_ptr());
    }

    #[test]
    fn last_line_may_lack_newline() {
        let readings: Vec<_> = Lines::new(b"A;1.0\nB;-2.5", 0).collect::<Result<_>>().unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[1].value, -25);
    }

    #[test]
    fn errors_carry_input_offset() {
        let mut lines = Lines::new(b"A;1.0\nB2.0\nC;3.0\n", 1000);
        assert!(lines.next().unwrap().is_ok());
        match lines.next() {
            Some(Err(Error::Parse { offset, .. })) => assert_eq!(offset, 1006),
            other => panic!("unexpected {other:?}"),
        }
        assert!(lines.next().is_none());
    }

    #[test]
    fn empty_key_is_rejected() {
        let mut lines = Lines::new(b";1.0\n", 0);
        assert!(matches!(lines.next(), Some(Err(Error::Parse { .. }))));
    }
}
