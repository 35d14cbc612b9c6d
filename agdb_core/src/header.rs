//! File header and version-dependent database header.
//!
//! The uncompressed stream opens with a fixed 12-byte file header followed
//! by a database header whose size (60, 116 or 228 bytes) depends on the
//! database version. The database header carries the record and sub-record
//! widths used by every later decode, so the record parsers are driven by
//! data, not hard-coded layouts.

use tracing::trace;

use crate::error::{Error, InvalidData, Result};
use crate::io::ByteSource;
use crate::stream::UncompressedStream;

pub const FILE_HEADER_SIZE: u32 = 12;

/// `unknown1` marker of the database layout this crate decodes
/// (`AgGlGlobalHistory.db`, `AgGlFaultHistory.db` and friends).
pub const DATABASE_MARKER_GLOBAL: u32 = 0x0E;

/// `unknown1` marker of the legacy `AgAppLaunch.db` layout, which is
/// recognized but not decoded.
pub const DATABASE_MARKER_APP_LAUNCH: u32 = 0x05;

const DATABASE_HEADER_SIZES: [u32; 3] = [60, 116, 228];

/// The fixed 12-byte header at uncompressed offset 0.
#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub unknown1: u32,
    pub data_size: u32,
    pub header_size: u32,
}

impl FileHeader {
    pub fn parse(data: &[u8; 12]) -> Self {
        Self {
            unknown1: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            data_size: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            header_size: u32::from_le_bytes([data[8], data[9], data[10], data[11]]),
        }
    }

    pub fn read<S: ByteSource>(stream: &mut UncompressedStream<S>) -> Result<Self> {
        let mut data = [0u8; FILE_HEADER_SIZE as usize];
        stream.read_exact(&mut data)?;
        Ok(Self::parse(&data))
    }

    /// Size of the database header that follows, after validation.
    pub fn database_header_size(&self) -> Result<u32> {
        let size = self
            .header_size
            .checked_sub(FILE_HEADER_SIZE)
            .filter(|size| DATABASE_HEADER_SIZES.contains(size))
            .ok_or(InvalidData::UnsupportedDatabaseHeaderSize {
                size: self.header_size.saturating_sub(FILE_HEADER_SIZE),
            })?;
        Ok(size)
    }
}

/// Record and sub-record widths extracted from the database header. Every
/// record decode is parameterized by these five values.
#[derive(Debug, Clone, Copy)]
pub struct RecordLayout {
    pub volume_record_size: u32,
    pub file_record_size: u32,
    pub source_record_size: u32,
    pub file_subrecord_type1_size: u32,
    pub file_subrecord_type2_size: u32,
}

#[derive(Debug, Clone)]
pub struct DatabaseHeader {
    pub database_type: u32,
    /// Nine parameter slots; the first five are the record widths.
    pub database_parameters: [u32; 9],
    pub number_of_volumes: u32,
    /// Total file count over all volumes. Informational: the per-volume
    /// counts inside the volume records are authoritative.
    pub number_of_files: u32,
    pub number_of_sources: u32,
    /// Only present in the 228-byte header variant.
    pub number_of_time_values: Option<u32>,
}

impl DatabaseHeader {
    /// Decode a database header from `data`, whose length must be one of the
    /// sizes accepted by [`FileHeader::database_header_size`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        if !DATABASE_HEADER_SIZES.contains(&(data.len() as u32)) {
            return Err(Error::InvalidData(
                InvalidData::UnsupportedDatabaseHeaderSize {
                    size: data.len() as u32,
                },
            ));
        }

        let field = |offset: usize| {
            u32::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ])
        };

        let mut database_parameters = [0u32; 9];
        for (slot, parameter) in database_parameters.iter_mut().enumerate() {
            *parameter = field(4 + slot * 4);
        }

        let number_of_time_values = if data.len() == 228 {
            // Trailed by 120 bytes of time-value data, not interpreted here.
            trace!("database header carries time values, skipping their data");
            Some(field(104))
        } else {
            None
        };

        Ok(Self {
            database_type: field(0),
            database_parameters,
            number_of_volumes: field(40),
            number_of_files: field(44),
            number_of_sources: field(52),
            number_of_time_values,
        })
    }

    pub fn read<S: ByteSource>(stream: &mut UncompressedStream<S>, size: u32) -> Result<Self> {
        let mut data = vec![0u8; size as usize];
        stream.read_exact(&mut data)?;
        Self::parse(&data)
    }

    pub fn layout(&self) -> RecordLayout {
        RecordLayout {
            volume_record_size: self.database_parameters[0],
            file_record_size: self.database_parameters[1],
            source_record_size: self.database_parameters[2],
            file_subrecord_type1_size: self.database_parameters[3],
            file_subrecord_type2_size: self.database_parameters[4],
        }
    }
}
