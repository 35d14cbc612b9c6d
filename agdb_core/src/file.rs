use serde::Serialize;
use tracing::{trace, warn};

use crate::error::{Error, InvalidData, Result};
use crate::hash::path_hash;
use crate::header::RecordLayout;
use crate::io::ByteSource;
use crate::stream::UncompressedStream;
use crate::MAX_PATH_BYTES;

const SUBRECORD_TYPE1_SIZES: [u32; 2] = [16, 24];
const SUBRECORD_TYPE2_SIZES: [u32; 4] = [16, 20, 24, 32];

/// One file access record inside a volume.
///
/// Seven record widths are known. The 36/52/56/72-byte layouts keep 4-byte
/// fields ("32-bit mode"); 64/88/112 widen the leading fields ("64-bit
/// mode") and move the common fields accordingly. Only the common fields
/// are decoded; each width's remaining bytes are unknown.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    /// Full file path without its NUL terminator.
    #[serde(serialize_with = "crate::serialize_utf16")]
    pub path: Vec<u16>,
    /// Path fingerprint stored in the record; cross-checked against the
    /// computed hash of `path`.
    pub name_hash: u32,
    pub flags: u32,
    /// Count of type-1 sub-records trailing this record.
    pub number_of_entries: u32,
}

/// Byte offsets of the common fields plus the trailing alignment, by
/// record width: `(number_of_entries, flags, path_characters, name_hash,
/// alignment)`.
fn field_layout(record_size: u32) -> Option<(usize, usize, usize, usize, u64)> {
    match record_size {
        36 | 52 | 56 | 72 => Some((8, 12, 32, 4, 4)),
        64 | 88 | 112 => Some((16, 20, 40, 8, 8)),
        _ => None,
    }
}

impl FileRecord {
    pub fn path_lossy(&self) -> String {
        String::from_utf16_lossy(&self.path)
    }

    /// Decode one file record, its path, and skip its sub-records.
    pub fn read<S: ByteSource>(
        stream: &mut UncompressedStream<S>,
        layout: &RecordLayout,
        file_index: u32,
    ) -> Result<Self> {
        let record_size = layout.file_record_size;
        let (entries_offset, flags_offset, path_offset, hash_offset, alignment) =
            field_layout(record_size).ok_or(Error::InvalidData(
                InvalidData::UnsupportedRecordSize {
                    record: "file",
                    size: record_size,
                },
            ))?;

        let mut data = vec![0u8; record_size as usize];
        stream.read_exact(&mut data)?;

        let read_u32 = |offset: usize| {
            u32::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ])
        };

        let number_of_entries = read_u32(entries_offset);
        let flags = read_u32(flags_offset);
        let name_hash = read_u32(hash_offset);

        // The two low bits of the on-disk character count are an opaque
        // flag; the remaining bits count UTF-16 units without the NUL.
        let raw_characters = read_u32(path_offset);
        let path_size = if raw_characters != 0 {
            (raw_characters >> 2) * 2 + 2
        } else {
            0
        };

        let mut path = Vec::new();
        if path_size > 0 {
            if path_size > MAX_PATH_BYTES {
                return Err(Error::InvalidData(InvalidData::PathSizeExceedsMax {
                    size: path_size,
                    max: MAX_PATH_BYTES,
                }));
            }
            let mut bytes = vec![0u8; path_size as usize];
            stream.read_exact(&mut bytes)?;

            let computed = path_hash(&bytes[..bytes.len() - 2]);
            if computed != name_hash {
                warn!(
                    file = file_index,
                    stored = format_args!("{name_hash:#010x}"),
                    computed = format_args!("{computed:#010x}"),
                    "file path hash mismatch"
                );
            }

            path = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            if path.last() == Some(&0) {
                path.pop();
            }
        }

        stream.align_to(alignment)?;

        if number_of_entries > 0 {
            if !SUBRECORD_TYPE1_SIZES.contains(&layout.file_subrecord_type1_size) {
                return Err(Error::InvalidData(InvalidData::UnsupportedRecordSize {
                    record: "file sub-record type 1",
                    size: layout.file_subrecord_type1_size,
                }));
            }
            if !SUBRECORD_TYPE2_SIZES.contains(&layout.file_subrecord_type2_size) {
                return Err(Error::InvalidData(InvalidData::UnsupportedRecordSize {
                    record: "file sub-record type 2",
                    size: layout.file_subrecord_type2_size,
                }));
            }
            let skipped =
                u64::from(number_of_entries) * u64::from(layout.file_subrecord_type1_size);
            trace!(file = file_index, bytes = skipped, "skipping file sub-records");
            stream.seek(stream.position() + skipped)?;
        }

        Ok(Self {
            path,
            name_hash,
            flags,
            number_of_entries,
        })
    }
}
