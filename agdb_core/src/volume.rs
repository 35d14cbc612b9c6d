use serde::Serialize;
use tracing::trace;

use crate::error::{Error, InvalidData, Result};
use crate::file::FileRecord;
use crate::hash::path_hash;
use crate::header::RecordLayout;
use crate::io::ByteSource;
use crate::stream::UncompressedStream;
use crate::MAX_PATH_BYTES;

/// One volume and the file records declared under it.
///
/// The fixed record exists in a 56-byte and a 72-byte layout; the 72-byte
/// form widens several unknown fields to 8 bytes and aligns trailing data
/// to 8 instead of 4.
#[derive(Debug, Clone, Serialize)]
pub struct VolumeRecord {
    /// Windows internal device path, e.g. `\Device\HarddiskVolume2`,
    /// stored without its NUL terminator.
    #[serde(serialize_with = "crate::serialize_utf16")]
    pub device_path: Vec<u16>,
    /// Volume creation time as a FILETIME value.
    pub creation_time: u64,
    pub serial_number: u32,
    /// File count declared by this record; authoritative over the database
    /// header's total.
    pub number_of_files: u32,
    pub files: Vec<FileRecord>,
}

impl VolumeRecord {
    pub fn device_path_lossy(&self) -> String {
        String::from_utf16_lossy(&self.device_path)
    }

    /// Decode one volume record and its trailing file records from the
    /// stream cursor.
    pub fn read<S: ByteSource>(
        stream: &mut UncompressedStream<S>,
        layout: &RecordLayout,
        volume_index: u32,
    ) -> Result<Self> {
        let record_size = layout.volume_record_size;
        let alignment = match record_size {
            56 => 4,
            72 => 8,
            _ => {
                return Err(Error::InvalidData(InvalidData::UnsupportedRecordSize {
                    record: "volume",
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
        let read_u64 = |offset: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[offset..offset + 8]);
            u64::from_le_bytes(bytes)
        };
        let read_u16 = |offset: usize| u16::from_le_bytes([data[offset], data[offset + 1]]);

        let (number_of_files, creation_time, serial_number, device_path_chars) =
            if record_size == 56 {
                (read_u32(8), read_u64(24), read_u32(32), read_u16(44))
            } else {
                (read_u32(16), read_u64(32), read_u32(40), read_u16(56))
            };

        let mut device_path = Vec::new();
        if device_path_chars > 0 {
            let byte_size = (u32::from(device_path_chars) + 1) * 2;
            if byte_size > MAX_PATH_BYTES {
                return Err(Error::InvalidData(InvalidData::PathSizeExceedsMax {
                    size: byte_size,
                    max: MAX_PATH_BYTES,
                }));
            }
            let mut bytes = vec![0u8; byte_size as usize];
            stream.read_exact(&mut bytes)?;

            let hash = path_hash(&bytes[..bytes.len() - 2]);
            trace!(
                volume = volume_index,
                hash = format_args!("{hash:#010x}"),
                "device path hash"
            );

            device_path = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            if device_path.last() == Some(&0) {
                device_path.pop();
            }
        }

        stream.align_to(alignment)?;

        let mut files = Vec::with_capacity(number_of_files.min(1024) as usize);
        for file_index in 0..number_of_files {
            stream.ensure_not_aborted()?;
            files.push(FileRecord::read(stream, layout, file_index)?);
        }

        Ok(Self {
            device_path,
            creation_time,
            serial_number,
            number_of_files,
            files,
        })
    }
}
