//! Seekable view of the uncompressed database contents.
//!
//! [`UncompressedStream`] serves arbitrary-offset reads against the
//! conceptual concatenation of all block contents. Compressed blocks are
//! decoded on first touch and kept in a small LRU cache; raw files
//! degenerate to a pass-through over the byte source.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lru::LruCache;
use tracing::trace;

use crate::codec::BlockCodec;
use crate::container::{BlockDescriptor, BlockIndex, ContainerHeader};
use crate::error::{Error, InvalidData, Result};
use crate::io::ByteSource;

/// Decoded blocks kept in memory at once. At the 64 KiB Windows 7 block
/// size this bounds the cache at 1 MiB.
const BLOCK_CACHE_CAPACITY: usize = 16;

pub struct UncompressedStream<S> {
    source: S,
    header: ContainerHeader,
    blocks: Vec<BlockDescriptor>,
    /// Uncompressed start offset of each block, for binary search.
    starts: Vec<u64>,
    codec: Option<Box<dyn BlockCodec>>,
    cache: LruCache<usize, Vec<u8>>,
    position: u64,
    abort: Option<Arc<AtomicBool>>,
}

impl<S: ByteSource> UncompressedStream<S> {
    /// Assemble a stream from a scanned container.
    ///
    /// `codec` may be `None` for raw files; a compressed block encountered
    /// without a codec fails the read.
    pub fn new(
        source: S,
        header: ContainerHeader,
        index: BlockIndex,
        codec: Option<Box<dyn BlockCodec>>,
    ) -> Self {
        let blocks = index.blocks().to_vec();
        let mut starts = Vec::with_capacity(blocks.len());
        let mut start = 0u64;
        for block in &blocks {
            starts.push(start);
            start += u64::from(block.uncompressed_size);
        }
        Self {
            source,
            header,
            blocks,
            starts,
            codec,
            cache: LruCache::new(
                NonZeroUsize::new(BLOCK_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ),
            position: 0,
            abort: None,
        }
    }

    /// Install an externally-set abort flag, polled before each block
    /// decompression.
    pub fn with_abort(mut self, flag: Arc<AtomicBool>) -> Self {
        self.set_abort_flag(flag);
        self
    }

    pub fn set_abort_flag(&mut self, flag: Arc<AtomicBool>) {
        self.abort = Some(flag);
    }

    /// Size of the uncompressed stream in bytes.
    pub fn size(&self) -> u64 {
        u64::from(self.header.uncompressed_total_size)
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Fails when the abort flag has been set.
    pub fn ensure_not_aborted(&self) -> Result<()> {
        match &self.abort {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Aborted),
            _ => Ok(()),
        }
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.size() {
            return Err(Error::OutOfBounds {
                offset,
                size: self.size(),
            });
        }
        self.position = offset;
        Ok(())
    }

    /// Advance the cursor to the next multiple of `alignment`, consuming any
    /// padding bytes. Truncated padding fails like any other read.
    pub fn align_to(&mut self, alignment: u64) -> Result<()> {
        let rest = self.position % alignment;
        if rest != 0 {
            let padding = alignment - rest;
            trace!(padding, position = self.position, "consuming alignment padding");
            self.seek(self.position + padding)?;
        }
        Ok(())
    }

    /// Read from the cursor, advancing it. Returns a short count only at the
    /// end of the stream.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let count = self.read_at(self.position, buf)?;
        self.position += count as u64;
        Ok(count)
    }

    /// Read exactly `buf.len()` bytes from the cursor or fail.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let offset = self.position;
        let count = self.read(buf)?;
        if count != buf.len() {
            return Err(Error::ShortRead {
                offset,
                expected: buf.len(),
                actual: count,
            });
        }
        Ok(())
    }

    /// Read at an explicit offset without touching the cursor.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let size = self.size();
        if offset >= size {
            return Ok(0);
        }

        let mut position = offset;
        let mut filled = 0;
        while filled < buf.len() && position < size {
            // last block whose start is <= position
            let index = self.starts.partition_point(|&start| start <= position) - 1;
            let descriptor = self.blocks[index];
            let within = (position - self.starts[index]) as usize;
            let available = descriptor.uncompressed_size as usize - within;
            let count = available.min(buf.len() - filled);

            if descriptor.is_compressed {
                let block = self.block_bytes(index)?;
                buf[filled..filled + count].copy_from_slice(&block[within..within + count]);
            } else {
                // Pass-through: the "block" is the raw file itself.
                self.source.read_exact_at(
                    descriptor.compressed_offset + within as u64,
                    &mut buf[filled..filled + count],
                )?;
            }

            filled += count;
            position += count as u64;
        }
        Ok(filled)
    }

    /// Decompress block `index` if it is not cached, and return its bytes.
    fn block_bytes(&mut self, index: usize) -> Result<&[u8]> {
        self.ensure_not_aborted()?;

        let Self {
            source,
            blocks,
            codec,
            cache,
            abort: _,
            ..
        } = self;
        let descriptor = blocks[index];

        cache
            .try_get_or_insert(index, || decode_block(source, codec.as_deref(), descriptor, index))
            .map(|block| block.as_slice())
    }
}

fn decode_block(
    source: &mut impl ByteSource,
    codec: Option<&dyn BlockCodec>,
    descriptor: BlockDescriptor,
    index: usize,
) -> Result<Vec<u8>> {
    let codec = codec.ok_or(Error::Unsupported(
        "compressed block without a configured decompressor",
    ))?;

    let mut compressed = vec![0u8; descriptor.compressed_size as usize];
    source.read_exact_at(descriptor.compressed_offset, &mut compressed)?;

    let mut uncompressed = vec![0u8; descriptor.uncompressed_size as usize];
    let count = codec.decompress(&compressed, &mut uncompressed)?;
    if count != descriptor.uncompressed_size as usize {
        return Err(Error::InvalidData(InvalidData::DecompressionSizeMismatch {
            index,
            expected: descriptor.uncompressed_size,
            actual: count,
        }));
    }
    trace!(
        index,
        codec = codec.name(),
        compressed = descriptor.compressed_size,
        uncompressed = count,
        "decompressed block"
    );
    Ok(uncompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecompressError;
    use crate::io::SliceSource;

    /// Codec that repeats the first input byte `output.len()` times.
    struct FillCodec;

    impl BlockCodec for FillCodec {
        fn name(&self) -> &'static str {
            "fill"
        }

        fn decompress(&self, input: &[u8], output: &mut [u8]) -> Result<usize, DecompressError> {
            let value = *input.first().ok_or(DecompressError::UnexpectedEof)?;
            output.fill(value);
            Ok(output.len())
        }
    }

    /// Codec that always produces one byte, regardless of the output size.
    struct OneByteCodec;

    impl BlockCodec for OneByteCodec {
        fn name(&self) -> &'static str {
            "one-byte"
        }

        fn decompress(&self, _input: &[u8], output: &mut [u8]) -> Result<usize, DecompressError> {
            if output.is_empty() {
                return Err(DecompressError::OutputOverflow);
            }
            output[0] = 0xEE;
            Ok(1)
        }
    }

    fn win7_two_block_container() -> Vec<u8> {
        // Each "compressed" block is a single marker byte for FillCodec.
        let mut data = b"MEM0".to_vec();
        data.extend_from_slice(&(65536u32 + 100).to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.push(0x11);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.push(0x22);
        data
    }

    fn stream_for(data: &[u8], codec: Option<Box<dyn BlockCodec>>) -> UncompressedStream<SliceSource<'_>> {
        let mut source = SliceSource::new(data);
        let header = ContainerHeader::read(&mut source).unwrap();
        let index = BlockIndex::scan(&mut source, &header).unwrap();
        UncompressedStream::new(source, header, index, codec)
    }

    #[test]
    fn passthrough_reads_raw_bytes() {
        let mut data = vec![14u8, 0, 0, 0, 16, 0, 0, 0];
        data.extend(8u8..16);
        let mut stream = stream_for(&data, None);

        assert_eq!(stream.size(), 16);
        let mut buf = [0u8; 4];
        assert_eq!(stream.read_at(6, &mut buf).unwrap(), 4);
        assert_eq!(buf, [0, 0, 8, 9]);

        // cursor reads
        stream.seek(14).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[14, 15]);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn reads_cross_block_boundaries() {
        let data = win7_two_block_container();
        let mut stream = stream_for(&data, Some(Box::new(FillCodec)));
        assert_eq!(stream.size(), 65636);

        let mut buf = [0u8; 12];
        assert_eq!(stream.read_at(65530, &mut buf).unwrap(), 12);
        assert_eq!(&buf[..6], &[0x11; 6]);
        assert_eq!(&buf[6..], &[0x22; 6]);
    }

    #[test]
    fn repeated_reads_are_idempotent() {
        let data = win7_two_block_container();
        let mut stream = stream_for(&data, Some(Box::new(FillCodec)));

        let mut first = [0u8; 32];
        let mut second = [0u8; 32];
        stream.read_at(65520, &mut first).unwrap();
        stream.read_at(65520, &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn short_reads_only_at_end_of_stream() {
        let data = win7_two_block_container();
        let mut stream = stream_for(&data, Some(Box::new(FillCodec)));

        let mut buf = [0u8; 256];
        assert_eq!(stream.read_at(65600, &mut buf).unwrap(), 36);
        assert_eq!(stream.read_at(65636, &mut buf).unwrap(), 0);
        assert_eq!(stream.read_at(1 << 40, &mut buf).unwrap(), 0);
    }

    #[test]
    fn size_mismatch_is_fatal_for_the_read() {
        let data = win7_two_block_container();
        let mut stream = stream_for(&data, Some(Box::new(OneByteCodec)));

        let mut buf = [0u8; 4];
        assert!(matches!(
            stream.read_at(0, &mut buf),
            Err(Error::InvalidData(
                InvalidData::DecompressionSizeMismatch { index: 0, .. }
            ))
        ));
    }

    #[test]
    fn missing_codec_fails_compressed_reads() {
        let data = win7_two_block_container();
        let mut stream = stream_for(&data, None);

        let mut buf = [0u8; 4];
        assert!(matches!(
            stream.read_at(0, &mut buf),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn abort_flag_stops_decompression() {
        let data = win7_two_block_container();
        let flag = Arc::new(AtomicBool::new(true));
        let mut stream =
            stream_for(&data, Some(Box::new(FillCodec))).with_abort(Arc::clone(&flag));

        let mut buf = [0u8; 4];
        assert!(matches!(stream.read_at(0, &mut buf), Err(Error::Aborted)));

        flag.store(false, Ordering::Relaxed);
        assert_eq!(stream.read_at(0, &mut buf).unwrap(), 4);
    }

    #[test]
    fn align_to_advances_and_validates() {
        let mut data = vec![14u8, 0, 0, 0, 12, 0, 0, 0];
        data.extend(8u8..12);
        let mut stream = stream_for(&data, None);

        stream.seek(5).unwrap();
        stream.align_to(8).unwrap();
        assert_eq!(stream.position(), 8);
        stream.align_to(8).unwrap();
        assert_eq!(stream.position(), 8);

        // padding that would run past the end of the stream
        stream.seek(9).unwrap();
        assert!(matches!(
            stream.align_to(8),
            Err(Error::OutOfBounds { offset: 16, .. })
        ));
    }
}
