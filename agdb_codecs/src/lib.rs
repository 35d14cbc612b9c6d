//! Block decompressors for SuperFetch containers.
//!
//! Vista-era `MEMO` containers compress their blocks with LZNT1; Windows 7
//! `MEM0` containers use LZXpress-Huffman. Both implement the
//! [`BlockCodec`] contract from `agdb_core`: one call decodes one whole
//! container block into a caller-sized output buffer.

pub mod lznt1;
pub mod xpress;

pub use lznt1::Lznt1;
pub use xpress::XpressHuffman;

use agdb_core::codec::BlockCodec;
use agdb_core::container::FileType;

/// Resolve the codec matching a container classification.
///
/// Raw files need no codec. Windows 8 containers nominally use
/// LZXpress-Huffman as well, but their block framing is rejected earlier,
/// at the block scan.
pub fn codec_for(file_type: FileType) -> Option<Box<dyn BlockCodec>> {
    match file_type {
        FileType::Uncompressed => None,
        FileType::CompressedVista => Some(Box::new(Lznt1)),
        FileType::CompressedWindows7 | FileType::CompressedWindows8 => {
            Some(Box::new(XpressHuffman))
        }
    }
}
