use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Error, Result};

/// Random-access byte supplier backing the container layer.
///
/// Implementations return short reads only when the requested range runs past
/// the end of the source; callers that need a full buffer use
/// [`read_exact_at`](ByteSource::read_exact_at) and treat a short read as
/// failure.
pub trait ByteSource {
    /// Total size of the underlying artifact in bytes.
    fn size(&self) -> u64;

    /// Read into `buf` starting at `offset`, returning the number of bytes
    /// copied. Fails with [`Error::OutOfBounds`] when `offset` lies past the
    /// end of the source.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Read exactly `buf.len()` bytes at `offset` or fail.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let count = self.read_at(offset, buf)?;
        if count != buf.len() {
            return Err(Error::ShortRead {
                offset,
                expected: buf.len(),
                actual: count,
            });
        }
        Ok(())
    }
}

/// File-backed source.
pub struct FileSource {
    file: File,
    size: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path).map_err(Error::Open)?;
        let size = file.metadata().map_err(Error::Open)?.len();
        Ok(Self { file, size })
    }
}

impl ByteSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset > self.size {
            return Err(Error::OutOfBounds {
                offset,
                size: self.size,
            });
        }
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(Error::Seek)?;
        let mut total = 0;
        while total < buf.len() {
            match self.file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(count) => total += count,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Read(e)),
            }
        }
        Ok(total)
    }
}

/// In-memory source over a borrowed byte range, used by the tests and fuzz
/// harnesses.
pub struct SliceSource<'a> {
    data: &'a [u8],
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl ByteSource for SliceSource<'_> {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let size = self.data.len() as u64;
        if offset > size {
            return Err(Error::OutOfBounds { offset, size });
        }
        let start = offset as usize;
        let count = buf.len().min(self.data.len() - start);
        buf[..count].copy_from_slice(&self.data[start..start + count]);
        Ok(count)
    }
}
