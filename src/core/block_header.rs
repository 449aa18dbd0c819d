use std::io;

use crate::{
    Result,
    error::CorruptionError,
    varint::{encoded_len, read_i32, write_i32},
};

/// Header preceding every compressed block in the data stream
///
/// Stored as three varints: compressed length, first position, record count.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct BlockHeader {
    /// Number of compressed payload bytes that follow the header
    pub compressed_len: i32,

    /// Lowest position represented in the block
    pub first_position: i32,

    /// Number of records in the block
    pub num_records: i32,
}
impl BlockHeader {
    #[must_use]
    pub fn new(compressed_len: i32, first_position: i32, num_records: i32) -> Self {
        Self {
            compressed_len,
            first_position,
            num_records,
        }
    }

    /// Number of bytes the encoded header occupies
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        encoded_len(self.compressed_len)
            + encoded_len(self.first_position)
            + encoded_len(self.num_records)
    }

    /// Number of bytes the header and its payload occupy on disk
    #[must_use]
    pub fn block_len(&self) -> usize {
        self.encoded_len() + self.compressed_len.max(0) as usize
    }

    pub fn read_from<R: io::Read>(reader: &mut R) -> Result<Self> {
        let header = Self {
            compressed_len: read_i32(reader)?,
            first_position: read_i32(reader)?,
            num_records: read_i32(reader)?,
        };
        if header.compressed_len < 0 {
            return Err(CorruptionError::InvalidCompressedLength(header.compressed_len).into());
        }
        Ok(header)
    }

    pub fn write<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        write_i32(writer, self.compressed_len)?;
        write_i32(writer, self.first_position)?;
        write_i32(writer, self.num_records)?;
        Ok(())
    }
}
