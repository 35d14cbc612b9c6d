//! Read-only parser for Windows SuperFetch database files
//! (`AgGlGlobalHistory.db`, `AgGlFaultHistory.db` and relatives).
//!
//! The format is layered, and so is this crate:
//!
//! 1. [`container`] classifies the 8-byte container header (`MEMO`, `MEM0`,
//!    `MAM\x84` or raw) and walks the chain of compressed blocks into a
//!    [`container::BlockIndex`] without decompressing anything.
//! 2. [`stream`] serves arbitrary-offset reads against the uncompressed
//!    concatenation of all blocks, decoding blocks on demand through a
//!    [`codec::BlockCodec`] and a bounded LRU cache.
//! 3. [`reader`] decodes the file header, the version-dependent database
//!    header, and the volume / file / source records off that stream. The
//!    record widths come out of the database header, so decoding is driven
//!    by the data rather than hard-coded layouts.
//!
//! The decompressors themselves live in the `agdb_codecs` crate; this crate
//! only defines their contract.
//!
//! ```no_run
//! use agdb_core::{BlockIndex, ContainerHeader, FileSource, Parser, UncompressedStream};
//!
//! # fn main() -> agdb_core::Result<()> {
//! let mut source = FileSource::open("AgGlGlobalHistory.db")?;
//! let header = ContainerHeader::read(&mut source)?;
//! let index = BlockIndex::scan(&mut source, &header)?;
//! let codec = None; // agdb_codecs::codec_for(header.file_type) for compressed files
//! let stream = UncompressedStream::new(source, header, index, codec);
//! let database = Parser::new(stream).parse()?;
//! for volume in &database.volumes {
//!     println!("{}: {} files", volume.device_path_lossy(), volume.files.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod container;
pub mod error;
pub mod file;
pub mod hash;
pub mod header;
pub mod io;
pub mod reader;
pub mod source;
pub mod stream;
pub mod volume;

pub use codec::{BlockCodec, DecompressError};
pub use container::{BlockDescriptor, BlockIndex, ContainerHeader, FileType};
pub use error::{Error, InvalidData, Result};
pub use file::FileRecord;
pub use header::{DatabaseHeader, FileHeader, RecordLayout};
pub use io::{ByteSource, FileSource, SliceSource};
pub use reader::{Database, Parser};
pub use source::SourceRecord;
pub use stream::UncompressedStream;
pub use volume::VolumeRecord;

/// Largest accepted path payload (device path or file path), in bytes.
pub const MAX_PATH_BYTES: u32 = 128 * 1024;

/// Serialize UTF-16 path buffers as (lossy) strings.
pub(crate) fn serialize_utf16<S>(path: &[u16], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&String::from_utf16_lossy(path))
}
