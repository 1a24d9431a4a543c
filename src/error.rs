//! Error taxonomy for the aggregation pipeline.
//!
//! Every worker reports through `Result<_, Error>`; the orchestrator folds the
//! first real failure into [`Error::Partition`] so callers see a single error
//! per run.

use std::any::Any;
use std::fmt;
use std::io;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub enum Error {
    /// Invalid partition, sub-partition or buffer settings.
    Configuration(String),

    /// Opening or inspecting the input failed.
    ///
    /// The `io::Error` is kept behind an `Arc` so the error stays `Clone`.
    Io(Arc<io::Error>),

    /// A positioned read failed while streaming a chunk.
    Read { offset: u64, source: Arc<io::Error> },

    /// A positioned read returned fewer bytes than requested.
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    /// A line did not match `<key>;<signedDecimal>`.
    Parse { offset: u64, reason: String },

    /// No newline inside the scan window: some line is longer than assumed.
    BoundaryScan { offset: u64, window: usize },

    /// The worker stopped because a sibling failed.
    Cancelled,

    /// A worker thread panicked instead of reporting a result.
    Panicked(String),

    /// A partition task failed; `source` is the worker's own error.
    Partition { index: usize, source: Box<Error> },
}

impl Error {
    pub(crate) fn parse(offset: u64, reason: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".into())
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Read { offset, source } => {
                write!(f, "read error at offset {offset}: {source}")
            }
            Self::ShortRead {
                offset,
                expected,
                actual,
            } => write!(
                f,
                "read error at offset {offset}: read {actual} bytes, expected {expected}"
            ),
            Self::Parse { offset, reason } => {
                write!(f, "parse error in line at offset {offset}: {reason}")
            }
            Self::BoundaryScan { offset, window } => write!(
                f,
                "no newline within {window} bytes of offset {offset}; line longer than the scan window"
            ),
            Self::Cancelled => write!(f, "cancelled after a sibling task failed"),
            Self::Panicked(msg) => write!(f, "worker panicked: {msg}"),
            Self::Partition { index, source } => write!(f, "partition {index} failed: {source}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e.as_ref()),
            Self::Read { source, .. } => Some(source.as_ref()),
            Self::Partition { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn partition_error_exposes_worker_error() {
        let err = Error::Partition {
            index: 3,
            source: Box::new(Error::BoundaryScan {
                offset: 40,
                window: 200,
            }),
        };
        assert!(err.to_string().starts_with("partition 3 failed"));
        let inner = err.source().map(|e| e.to_string()).unwrap_or_default();
        assert!(inner.contains("offset 40"));
    }

    #[test]
    fn io_errors_convert_and_clone() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        let cloned = err.clone();
        assert!(matches!(cloned, Error::Io(_)));
        assert!(!cloned.is_cancelled());
    }
}
