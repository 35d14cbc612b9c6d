use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::trace;

use crate::error::{Error, InvalidData, Result};
use crate::header::RecordLayout;
use crate::io::ByteSource;
use crate::stream::UncompressedStream;

const SUBRECORD_TYPE2_SIZES: [u32; 4] = [16, 20, 24, 32];

/// One source (executable) record.
///
/// The 60/88-byte layouts carry a sub-record count and no filename; the
/// 100/144-byte layouts embed a 16-byte ASCII executable filename and no
/// sub-records. Sub-records use the file sub-record type 2 width.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    executable_filename: [u8; 16],
    /// Index of the first NUL in `executable_filename`, or 16 when the
    /// field is full.
    terminator: usize,
    pub number_of_entries: u32,
}

impl SourceRecord {
    /// Executable filename as declared by the record; empty for the
    /// filename-less 60/88-byte layouts.
    pub fn executable_filename(&self) -> String {
        self.executable_filename[..self.terminator]
            .iter()
            .map(|&byte| char::from(byte))
            .collect()
    }

    /// Decode one source record from the stream cursor and skip its
    /// sub-records.
    pub fn read<S: ByteSource>(
        stream: &mut UncompressedStream<S>,
        layout: &RecordLayout,
        source_index: u32,
    ) -> Result<Self> {
        let record_size = layout.source_record_size;
        let filename_offset = match record_size {
            60 | 88 => None,
            100 => Some(44),
            144 => Some(72),
            _ => {
                return Err(Error::InvalidData(InvalidData::UnsupportedRecordSize {
                    record: "source",
                    size: record_size,
                }))
            }
        };

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

        // The count sits after the (width-dependent) name hash field.
        let number_of_entries = match record_size {
            60 => read_u32(8),
            88 => read_u32(16),
            _ => 0,
        };

        let mut executable_filename = [0u8; 16];
        if let Some(offset) = filename_offset {
            executable_filename.copy_from_slice(&data[offset..offset + 16]);
        }
        let terminator = executable_filename
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(16);

        if number_of_entries > 0 {
            if !SUBRECORD_TYPE2_SIZES.contains(&layout.file_subrecord_type2_size) {
                return Err(Error::InvalidData(InvalidData::UnsupportedRecordSize {
                    record: "file sub-record type 2",
                    size: layout.file_subrecord_type2_size,
                }));
            }
            let skipped =
                u64::from(number_of_entries) * u64::from(layout.file_subrecord_type2_size);
            trace!(
                source = source_index,
                bytes = skipped,
                "skipping source sub-records"
            );
            stream.seek(stream.position() + skipped)?;
        }

        Ok(Self {
            executable_filename,
            terminator,
            number_of_entries,
        })
    }
}

impl Serialize for SourceRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut record = serializer.serialize_struct("SourceRecord", 2)?;
        record.serialize_field("executable_filename", &self.executable_filename())?;
        record.serialize_field("number_of_entries", &self.number_of_entries)?;
        record.end()
    }
}
