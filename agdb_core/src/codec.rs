use thiserror::Error;

/// Failure modes shared by the block decompressors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecompressError {
    #[error("unexpected end of compressed input")]
    UnexpectedEof,

    #[error("match offset {offset} reaches before the start of the output")]
    InvalidOffset { offset: usize },

    #[error("output buffer is too small for the decoded data")]
    OutputOverflow,

    #[error("corrupt prefix code table")]
    InvalidCodeTable,

    #[error("invalid match length")]
    InvalidMatchLength,
}

/// Decoder for one compressed container block.
///
/// `input` is a whole compressed block as located by the block index;
/// `output` must be sized to exactly the block's expected uncompressed size.
/// Implementations consume all of `input` or fail, and return the number of
/// bytes produced. The stream layer treats any count other than
/// `output.len()` as a size mismatch.
pub trait BlockCodec {
    /// Short codec name used in trace output.
    fn name(&self) -> &'static str;

    fn decompress(&self, input: &[u8], output: &mut [u8]) -> Result<usize, DecompressError>;
}
