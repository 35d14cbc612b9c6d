use std::io;

use thiserror::Error;

use crate::codec::DecompressError;

pub type Result<R, E = Error> = std::result::Result<R, E>;

/// Structural validation failures that make a database unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidData {
    #[error("unrecognized container signature")]
    BadSignature,

    #[error("container layout is recognized but its block framing is not supported")]
    UnsupportedContainer,

    #[error("compressed block {index} has zero size")]
    ZeroBlock { index: usize },

    #[error("block {index} decompressed to {actual} bytes, descriptor says {expected}")]
    DecompressionSizeMismatch {
        index: usize,
        expected: u32,
        actual: usize,
    },

    #[error("unsupported {record} record size {size}")]
    UnsupportedRecordSize { record: &'static str, size: u32 },

    #[error("unsupported database header size {size}")]
    UnsupportedDatabaseHeaderSize { size: u32 },

    #[error("declared data size {declared} does not match the stream size {actual}")]
    InconsistentFileSize { declared: u64, actual: u64 },

    #[error("path size {size} exceeds the {max} byte maximum")]
    PathSizeExceedsMax { size: u32, max: u32 },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to open file: {0}")]
    Open(#[source] io::Error),

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("seek failed: {0}")]
    Seek(#[source] io::Error),

    #[error("offset {offset} is out of bounds (size {size})")]
    OutOfBounds { offset: u64, size: u64 },

    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("invalid data: {0}")]
    InvalidData(InvalidData),

    #[error("decompression failed: {0}")]
    Decompression(#[from] DecompressError),

    #[error("parsing was aborted")]
    Aborted,

    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl From<InvalidData> for Error {
    fn from(kind: InvalidData) -> Self {
        Error::InvalidData(kind)
    }
}
