//! The replication wire format.
//!
//! Frames are a single kind byte followed by length-prefixed fields; all
//! multi-byte integers are little-endian. A length prefix is a `u32` followed
//! by that many raw bytes. Framing carries no markers and no checksums: a
//! short read, an unknown kind byte, or a length beyond its cap is a hard
//! protocol error on the receiving side.

mod event;
pub mod primitive;
mod stat;

#[cfg(test)]
mod tests;

use std::fmt;
use std::io;
use std::str::Utf8Error;

pub use event::{Kind, WireEvent};
pub use stat::Stat;

/// Result of wire decoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Size of an encoded [`Stat`] record.
pub const STAT_LEN: usize = 20;

/// Maximum encoded length of a directory path.
pub const MAX_PATH_LEN: usize = 1024;

/// Maximum encoded length of an entry name.
pub const MAX_NAME_LEN: usize = 255;

/// Chunk size for large-file transfers, and the cap on any content field.
/// Regular files strictly larger than this travel as `Big`/`BigFinish`
/// chunks; everything else fits in a single `Write`.
pub const BIG_CHUNK_LEN: usize = 2 << 20;

/// Wire decoding errors.
#[derive(Debug)]
pub enum Error {
    /// Short read or any other I/O failure on the underlying stream.
    Io(io::Error),
    /// The kind byte does not name a known event kind.
    UnknownKind(u8),
    /// A length prefix exceeds the cap for its field.
    Oversize { field: &'static str, len: usize, max: usize },
    /// A stat blob is not exactly [`STAT_LEN`] bytes.
    BadStatLen(usize),
    /// A path field is not valid UTF-8.
    BadString { field: &'static str, source: Utf8Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "wire read failed: {err}"),
            Error::UnknownKind(kind) => write!(f, "unknown event kind {kind}"),
            Error::Oversize { field, len, max } => {
                write!(f, "{field} length {len} exceeds cap {max}")
            }
            Error::BadStatLen(len) => write!(f, "stat blob is {len} bytes, expected {STAT_LEN}"),
            Error::BadString { field, source } => write!(f, "{field} is not UTF-8: {source}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::BadString { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
