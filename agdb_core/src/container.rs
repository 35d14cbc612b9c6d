//! Compressed container layer.
//!
//! A SuperFetch database is stored either raw or inside one of three
//! compressed containers, identified by the first four bytes of the file:
//!
//! | Signature  | Windows version | Codec             | Block size |
//! |------------|-----------------|-------------------|------------|
//! | `MEMO`     | Vista           | LZNT1             | 4 KiB      |
//! | `MEM0`     | 7               | LZXpress-Huffman  | 64 KiB     |
//! | `MAM\x84`  | 8               | LZXpress-Huffman  | 64 KiB     |
//!
//! The container holds a chain of variable-sized compressed blocks with no
//! index structure on disk; [`BlockIndex::scan`] walks the chain once and
//! records where every block lives without decompressing anything.

use tracing::debug;

use crate::error::{Error, InvalidData, Result};
use crate::io::ByteSource;

pub const SIGNATURE_VISTA: &[u8; 4] = b"MEMO";
pub const SIGNATURE_WIN7: &[u8; 4] = b"MEM0";
pub const SIGNATURE_WIN8: &[u8; 4] = b"MAM\x84";

/// Maximum accepted uncompressed stream size: 1 GiB. Real SuperFetch
/// databases are a few megabytes; anything near this cap is corrupt.
pub const MAX_UNCOMPRESSED_SIZE: u32 = 1 << 30;

/// First header field values seen in raw (uncompressed) databases.
const UNCOMPRESSED_MARKERS: [u32; 3] = [0x05, 0x0E, 0x0F];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Uncompressed,
    CompressedVista,
    CompressedWindows7,
    CompressedWindows8,
}

impl FileType {
    pub fn is_compressed(self) -> bool {
        !matches!(self, FileType::Uncompressed)
    }
}

/// Decoded form of the 8-byte container header.
#[derive(Debug, Clone)]
pub struct ContainerHeader {
    pub file_type: FileType,
    pub file_size: u64,
    /// Uncompressed size of every block except possibly the last.
    pub uncompressed_block_size: u32,
    /// Total size of the uncompressed stream. Unknown (zero) for Windows 8
    /// containers, whose header carries no size field.
    pub uncompressed_total_size: u32,
}

impl ContainerHeader {
    pub fn read(source: &mut impl ByteSource) -> Result<Self> {
        let mut data = [0u8; 8];
        source.read_exact_at(0, &mut data)?;
        Self::parse(&data, source.size())
    }

    /// Classify the first 8 bytes of a file of `file_size` bytes.
    pub fn parse(data: &[u8; 8], file_size: u64) -> Result<Self> {
        let trailer = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);

        let (file_type, uncompressed_block_size, uncompressed_total_size) = match &data[0..4] {
            sig if sig == SIGNATURE_VISTA => (FileType::CompressedVista, 4096, trailer),
            sig if sig == SIGNATURE_WIN7 => (FileType::CompressedWindows7, 65536, trailer),
            sig if sig == SIGNATURE_WIN8 => (FileType::CompressedWindows8, 65536, 0),
            _ => {
                // No signature: raw databases start with a small marker value
                // and restate their own file size in bytes 4..8.
                let marker = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                if !UNCOMPRESSED_MARKERS.contains(&marker) || file_size != u64::from(trailer) {
                    return Err(InvalidData::BadSignature.into());
                }
                (FileType::Uncompressed, trailer, trailer)
            }
        };

        if uncompressed_total_size > MAX_UNCOMPRESSED_SIZE {
            return Err(Error::InvalidData(InvalidData::InconsistentFileSize {
                declared: u64::from(uncompressed_total_size),
                actual: file_size,
            }));
        }

        Ok(Self {
            file_type,
            file_size,
            uncompressed_block_size,
            uncompressed_total_size,
        })
    }
}

/// Location and size of one compressed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// File offset of the block's compressed bytes. For Vista blocks this
    /// includes the 2-byte chunk header, which LZNT1 consumes itself.
    pub compressed_offset: u64,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub is_compressed: bool,
}

/// The result of walking the container's block chain once.
#[derive(Debug, Clone)]
pub struct BlockIndex {
    blocks: Vec<BlockDescriptor>,
}

impl BlockIndex {
    /// Walk the block chain of `source` and record every block.
    ///
    /// Raw files produce a single pass-through descriptor covering the whole
    /// file. Windows 8 containers are recognized but their block framing was
    /// never reverse-engineered, so they fail with
    /// [`InvalidData::UnsupportedContainer`].
    pub fn scan(source: &mut impl ByteSource, header: &ContainerHeader) -> Result<Self> {
        match header.file_type {
            FileType::Uncompressed => Ok(Self {
                blocks: vec![BlockDescriptor {
                    compressed_offset: 0,
                    compressed_size: header.uncompressed_total_size,
                    uncompressed_size: header.uncompressed_total_size,
                    is_compressed: false,
                }],
            }),
            FileType::CompressedVista | FileType::CompressedWindows7 => {
                Self::scan_compressed(source, header)
            }
            FileType::CompressedWindows8 => Err(InvalidData::UnsupportedContainer.into()),
        }
    }

    fn scan_compressed(source: &mut impl ByteSource, header: &ContainerHeader) -> Result<Self> {
        let mut offset: u64 = 8;
        let mut remaining = header.uncompressed_total_size;
        let mut blocks = Vec::new();

        while offset < header.file_size && remaining > 0 {
            let compressed_size = match header.file_type {
                FileType::CompressedVista => {
                    // The 2-byte LZNT1 chunk header doubles as the block size
                    // field and stays part of the compressed payload.
                    let mut data = [0u8; 2];
                    source.read_exact_at(offset, &mut data)?;
                    let value = u16::from_le_bytes(data);
                    u32::from(value & 0x0FFF) + 3
                }
                FileType::CompressedWindows7 => {
                    // A 4-byte length prefix that is not part of the payload.
                    let mut data = [0u8; 4];
                    source.read_exact_at(offset, &mut data)?;
                    offset += 4;
                    u32::from_le_bytes(data)
                }
                _ => unreachable!("scan_compressed is only called for Vista and Windows 7"),
            };

            if compressed_size == 0 {
                return Err(InvalidData::ZeroBlock {
                    index: blocks.len(),
                }
                .into());
            }
            let uncompressed_size = remaining.min(header.uncompressed_block_size);

            blocks.push(BlockDescriptor {
                compressed_offset: offset,
                compressed_size,
                uncompressed_size,
                is_compressed: true,
            });

            offset += u64::from(compressed_size);
            remaining -= uncompressed_size;
        }

        if remaining > 0 {
            return Err(Error::InvalidData(InvalidData::InconsistentFileSize {
                declared: u64::from(header.uncompressed_total_size),
                actual: u64::from(header.uncompressed_total_size - remaining),
            }));
        }
        if offset < header.file_size {
            debug!(
                trailing_bytes = header.file_size - offset,
                "container has trailing data after the last compressed block"
            );
        }

        Ok(Self { blocks })
    }

    pub fn blocks(&self) -> &[BlockDescriptor] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
