//! Crate-wide error type.
//!
//! Every public operation that can fail returns `Result<T, Error>`. The
//! taxonomy follows the propagation policy: corruption detected while
//! reading a single segment or WAL record is recoverable by the caller
//! (skip the segment, skip the record); corruption detected while writing
//! is fatal to that write.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// I/O failure: disk full, permission denied, missing file.
    Io(std::io::Error),

    /// On-disk data failed to parse: bad magic, misaligned offset record,
    /// truncated posting block, unreadable FST.
    Format {
        message: String,
        path: Option<String>,
    },

    /// `serde_json` (de)serialization failure for `meta.json`/`index.json`.
    Serialization(String),

    /// Caller-supplied argument is invalid (e.g. `top_k == 0` where the
    /// contract requires `> 0`, an empty index directory passed to `open`).
    InvalidArgument(String),

    /// A `RwLock`/`Mutex` guarding shared state was poisoned by a panic in
    /// another thread. Fatal at process scope per the propagation policy,
    /// but surfaced here rather than panicking a second time.
    Poisoned(String),

    /// A named resource (segment directory, term, file) was not found.
    NotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Format { message, path } => match path {
                Some(p) => write!(f, "format error in {p}: {message}"),
                None => write!(f, "format error: {message}"),
            },
            Self::Serialization(msg) => write!(f, "serialization error: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Poisoned(resource) => write!(f, "lock poisoned: {resource}"),
            Self::NotFound(resource) => write!(f, "not found: {resource}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Poisoned(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
