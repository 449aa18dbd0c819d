use std::io;

use crate::{
    Codec, MAX_BLOCK_BYTES, Result,
    error::{CorruptionError, FormatError, WriteError},
    varint::{MAX_VARINT_BYTES, decode_i32, write_i32},
};

use super::utils::extension_read;
use super::{AnnotationRecord, BlockHeader, BlockRange};

/// An annotation record paired with its absolute position
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionedRecord {
    pub position: i32,
    pub record: AnnotationRecord,
}

/// A block as stored in the data stream: header plus still-compressed payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressedBlock {
    pub header: BlockHeader,

    /// Byte offset of the block header in the data stream
    pub offset: u64,

    /// Compressed payload
    data: Vec<u8>,
}
impl CompressedBlock {
    /// Reads a header and exactly `compressed_len` payload bytes from `reader`
    pub fn read_from<R: io::Read>(reader: &mut R, offset: u64) -> Result<Self> {
        let header = BlockHeader::read_from(reader)?;
        Self::read_payload(reader, header, offset)
    }

    /// Reads the payload of a block whose header was already consumed from `reader`
    pub fn read_payload<R: io::Read>(reader: &mut R, header: BlockHeader, offset: u64) -> Result<Self> {
        let mut data = Vec::new();
        extension_read(
            reader,
            &mut data,
            header.compressed_len as usize,
            "block payload",
        )?;
        Ok(Self {
            header,
            offset,
            data,
        })
    }

    pub fn write<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.header.write(writer)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the compressed payload, for repair and inspection tooling
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Number of bytes the block occupies on disk
    #[must_use]
    pub fn block_len(&self) -> usize {
        self.header.block_len()
    }

    /// Decompresses the payload into `ubuf`
    pub fn decompress<C: Codec>(&self, codec: &mut C, ubuf: &mut Vec<u8>) -> Result<()> {
        let expected_len = codec.decompressed_len(&self.data)?;
        codec.decompress(&self.data, ubuf, expected_len)
    }

    /// Decompresses and parses the payload into position-tagged records
    ///
    /// `ubuf` is a reusable scratch buffer and holds the decompressed payload afterwards.
    pub fn decode<C: Codec>(
        &self,
        codec: &mut C,
        ubuf: &mut Vec<u8>,
    ) -> Result<Vec<PositionedRecord>> {
        self.decompress(codec, ubuf)?;
        decode_payload(ubuf, &self.header)
    }
}

/// Parses a decompressed payload
///
/// The payload opens with the record count, followed by one
/// `(position delta, ref, alt, annotation)` tuple per record. The first delta is
/// taken from the block's first position and must be zero; every later delta is
/// taken from the previous record's position.
pub(crate) fn decode_payload(bytes: &[u8], header: &BlockHeader) -> Result<Vec<PositionedRecord>> {
    let mut offset = 0;
    let count = decode_i32(bytes, &mut offset)?;
    if count != header.num_records {
        return Err(CorruptionError::RecordCountMismatch {
            expected: header.num_records,
            found: count,
        }
        .into());
    }
    if count < 0 {
        return Err(FormatError::NegativeLength(count).into());
    }

    // every record needs at least four bytes, which caps a bogus count
    let mut records = Vec::with_capacity((count as usize).min(bytes.len() / 4));
    let mut position = header.first_position;
    for i in 0..count {
        let delta = decode_i32(bytes, &mut offset)?;
        if delta < 0 {
            return Err(FormatError::NegativeDelta { position, delta }.into());
        }
        if i == 0 && delta != 0 {
            return Err(CorruptionError::FirstPositionMismatch {
                expected: header.first_position,
                found: position.saturating_add(delta),
            }
            .into());
        }
        position = position
            .checked_add(delta)
            .ok_or(FormatError::PositionOverflow { position, delta })?;
        let record = AnnotationRecord::decode(bytes, &mut offset)?;
        records.push(PositionedRecord { position, record });
    }

    if offset != bytes.len() {
        return Err(CorruptionError::TrailingBytes(bytes.len() - offset).into());
    }
    Ok(records)
}

/// Accumulates position-sorted records and seals them into a [`CompressedBlock`]
#[derive(Clone, Default)]
pub struct BlockBuilder {
    /// Encoded records, without the leading record count
    rbuf: Vec<u8>,

    /// Reusable buffer for the full uncompressed payload
    ubuf: Vec<u8>,

    num_records: i32,
    first_position: i32,
    last_position: i32,
}
impl BlockBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_records == 0
    }

    /// Number of encoded record bytes (uncompressed)
    #[must_use]
    pub fn size(&self) -> usize {
        self.rbuf.len()
    }

    #[must_use]
    pub fn num_records(&self) -> usize {
        self.num_records as usize
    }

    /// Position of the most recently pushed record
    #[must_use]
    pub fn last_position(&self) -> Option<i32> {
        (!self.is_empty()).then_some(self.last_position)
    }

    /// Uncompressed payload size once `record` is appended, counting varints at their widest
    #[must_use]
    pub fn size_with(&self, record: &AnnotationRecord) -> usize {
        MAX_VARINT_BYTES + self.rbuf.len() + MAX_VARINT_BYTES + record.encoded_len()
    }

    /// Whether `record` can be appended without exceeding [`MAX_BLOCK_BYTES`]
    #[must_use]
    pub fn fits(&self, record: &AnnotationRecord) -> bool {
        self.size_with(record) <= MAX_BLOCK_BYTES
    }

    /// Appends a record; positions must be non-decreasing within a block
    pub fn push(&mut self, position: i32, record: &AnnotationRecord) -> Result<()> {
        let delta = if self.is_empty() {
            0
        } else {
            match position.checked_sub(self.last_position) {
                Some(delta) if delta >= 0 => delta,
                Some(delta) => {
                    return Err(FormatError::NegativeDelta {
                        position: self.last_position,
                        delta,
                    }
                    .into());
                }
                None if position < self.last_position => {
                    return Err(FormatError::NegativeDelta {
                        position: self.last_position,
                        delta: i32::MIN,
                    }
                    .into());
                }
                None => {
                    return Err(FormatError::PositionOverflow {
                        position: self.last_position,
                        delta: i32::MAX,
                    }
                    .into());
                }
            }
        };
        if !self.fits(record) {
            return Err(WriteError::BlockTooLarge {
                size: self.size_with(record),
                max: MAX_BLOCK_BYTES,
            }
            .into());
        }
        if self.is_empty() {
            self.first_position = position;
        }
        write_i32(&mut self.rbuf, delta)?;
        record.write(&mut self.rbuf)?;
        self.last_position = position;
        self.num_records += 1;
        Ok(())
    }

    /// Compresses the pending records into a block located at `offset` and resets the builder
    ///
    /// An empty builder seals into a valid zero-record block.
    pub fn seal<C: Codec>(&mut self, codec: &mut C, offset: u64) -> Result<CompressedBlock> {
        self.ubuf.clear();
        write_i32(&mut self.ubuf, self.num_records)?;
        self.ubuf.extend_from_slice(&self.rbuf);
        if self.ubuf.len() > MAX_BLOCK_BYTES {
            return Err(WriteError::BlockTooLarge {
                size: self.ubuf.len(),
                max: MAX_BLOCK_BYTES,
            }
            .into());
        }

        let mut data = Vec::new();
        codec.compress(&self.ubuf, &mut data)?;

        let header = BlockHeader::new(data.len() as i32, self.first_position, self.num_records);
        self.clear();
        Ok(CompressedBlock {
            header,
            offset,
            data,
        })
    }

    /// Seals and writes the pending records, returning the index entry of the new block
    ///
    /// Nothing is written when the builder is empty.
    pub fn flush_to<W: io::Write, C: Codec>(
        &mut self,
        writer: &mut W,
        codec: &mut C,
        offset: u64,
    ) -> Result<Option<BlockRange>> {
        if self.is_empty() {
            return Ok(None);
        }
        let last_position = self.last_position;
        let block = self.seal(codec, offset)?;
        block.write(writer)?;
        Ok(Some(BlockRange::new(
            offset,
            block.block_len() as u32,
            block.header.first_position,
            last_position,
            block.header.num_records as u32,
        )))
    }

    fn clear(&mut self) {
        self.rbuf.clear();
        self.num_records = 0;
        self.first_position = 0;
        self.last_position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, ZstdCodec, varint::write_str};

    fn synthetic_records(n: usize) -> Vec<(i32, AnnotationRecord)> {
        (0..n)
            .map(|i| {
                // two alleles per site
                let position = 10_000 + (i / 2) as i32 * 3;
                let alt = if i % 2 == 0 { "G" } else { "T" };
                let annotation = format!("{{\"id\":{i},\"af\":0.{i:04}}}");
                (position, AnnotationRecord::new("A", alt, &annotation))
            })
            .collect()
    }

    fn seal_records(records: &[(i32, AnnotationRecord)]) -> Result<CompressedBlock> {
        let mut builder = BlockBuilder::new();
        for (position, record) in records {
            builder.push(*position, record)?;
        }
        builder.seal(&mut ZstdCodec::default(), 0)
    }

    fn round_trip(n: usize) -> Result<()> {
        let records = synthetic_records(n);
        let block = seal_records(&records)?;
        assert_eq!(block.header.num_records as usize, n);

        // pass through the on-disk form
        let mut disk = Vec::new();
        block.write(&mut disk)?;
        assert_eq!(disk.len(), block.block_len());
        let reread = CompressedBlock::read_from(&mut io::Cursor::new(&disk), 0)?;
        assert_eq!(reread, block);

        let mut ubuf = Vec::new();
        let decoded = reread.decode(&mut ZstdCodec::default(), &mut ubuf)?;
        assert_eq!(decoded.len(), n);
        for (decoded, (position, record)) in decoded.iter().zip(&records) {
            assert_eq!(decoded.position, *position);
            assert_eq!(&decoded.record, record);
        }
        Ok(())
    }

    #[test]
    fn test_round_trip_empty() -> Result<()> {
        round_trip(0)
    }

    #[test]
    fn test_round_trip_single() -> Result<()> {
        round_trip(1)
    }

    #[test]
    fn test_round_trip_thousand() -> Result<()> {
        round_trip(1000)
    }

    #[test]
    fn test_first_position_is_lowest() -> Result<()> {
        let block = seal_records(&synthetic_records(10))?;
        assert_eq!(block.header.first_position, 10_000);
        Ok(())
    }

    #[test]
    fn test_builder_rejects_decreasing_positions() -> Result<()> {
        let mut builder = BlockBuilder::new();
        builder.push(100, &AnnotationRecord::new("A", "C", "{}"))?;
        let result = builder.push(99, &AnnotationRecord::new("A", "C", "{}"));
        assert!(matches!(
            result,
            Err(Error::FormatError(FormatError::NegativeDelta { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_builder_rejects_overflowing_delta() -> Result<()> {
        let record = AnnotationRecord::new("A", "C", "{}");
        let mut builder = BlockBuilder::new();
        builder.push(-2_000_000_000, &record)?;
        let result = builder.push(2_000_000_000, &record);
        assert!(matches!(
            result,
            Err(Error::FormatError(FormatError::PositionOverflow { .. }))
        ));

        let mut builder = BlockBuilder::new();
        builder.push(2_000_000_000, &record)?;
        let result = builder.push(-2_000_000_000, &record);
        assert!(matches!(
            result,
            Err(Error::FormatError(FormatError::NegativeDelta { .. }))
        ));
        assert_eq!(builder.num_records(), 1);
        Ok(())
    }

    #[test]
    fn test_builder_rejects_oversized_record() -> Result<()> {
        let mut builder = BlockBuilder::new();
        builder.push(10, &AnnotationRecord::new("A", "C", "{}"))?;

        let huge = AnnotationRecord::new("A", "G", &"x".repeat(MAX_BLOCK_BYTES));
        assert!(!builder.fits(&huge));
        let result = builder.push(11, &huge);
        assert!(matches!(
            result,
            Err(Error::WriteError(WriteError::BlockTooLarge { .. }))
        ));

        // the rejected record left the block intact
        assert_eq!(builder.num_records(), 1);
        assert_eq!(builder.last_position(), Some(10));
        let block = builder.seal(&mut ZstdCodec::default(), 0)?;
        assert_eq!(block.decode(&mut ZstdCodec::default(), &mut Vec::new())?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_flush_empty_builder() -> Result<()> {
        let mut builder = BlockBuilder::new();
        let mut sink = Vec::new();
        let range = builder.flush_to(&mut sink, &mut ZstdCodec::default(), 8)?;
        assert!(range.is_none());
        assert!(sink.is_empty());
        Ok(())
    }

    #[test]
    fn test_flush_reports_range() -> Result<()> {
        let records = synthetic_records(6);
        let mut builder = BlockBuilder::new();
        for (position, record) in &records {
            builder.push(*position, record)?;
        }
        assert_eq!(builder.last_position(), Some(10_006));

        let mut sink = Vec::new();
        let range = builder
            .flush_to(&mut sink, &mut ZstdCodec::default(), 8)?
            .expect("non-empty builder");
        assert_eq!(range.offset(), 8);
        assert_eq!(range.length() as usize, sink.len());
        assert_eq!(range.first_position(), 10_000);
        assert_eq!(range.last_position(), 10_006);
        assert_eq!(range.num_records(), 6);
        assert!(builder.is_empty());
        Ok(())
    }

    #[test]
    fn test_corrupted_payload_is_detected() -> Result<()> {
        let mut block = seal_records(&synthetic_records(200))?;
        let mid = block.payload().len() / 2;
        block.payload_mut()[mid] ^= 0x5A;

        let result = block.decode(&mut ZstdCodec::default(), &mut Vec::new());
        assert!(result.unwrap_err().is_corruption());
        Ok(())
    }

    #[test]
    fn test_truncated_payload() -> Result<()> {
        let block = seal_records(&synthetic_records(20))?;
        let mut disk = Vec::new();
        block.write(&mut disk)?;
        disk.truncate(disk.len() - 3);

        let result = CompressedBlock::read_from(&mut io::Cursor::new(&disk), 0);
        assert!(matches!(
            result,
            Err(Error::FormatError(FormatError::UnexpectedEndOfStream(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_record_count_mismatch() -> Result<()> {
        let block = seal_records(&synthetic_records(2))?;
        let mut ubuf = Vec::new();
        block.decompress(&mut ZstdCodec::default(), &mut ubuf)?;

        let header = BlockHeader::new(block.header.compressed_len, 10_000, 3);
        let result = decode_payload(&ubuf, &header);
        assert!(matches!(
            result,
            Err(Error::CorruptionError(
                CorruptionError::RecordCountMismatch {
                    expected: 3,
                    found: 2
                }
            ))
        ));
        Ok(())
    }

    #[test]
    fn test_nonzero_first_delta() -> Result<()> {
        let mut payload = Vec::new();
        write_i32(&mut payload, 1)?;
        write_i32(&mut payload, 5)?;
        write_str(&mut payload, "A")?;
        write_str(&mut payload, "G")?;
        write_str(&mut payload, "{}")?;

        let header = BlockHeader::new(0, 1000, 1);
        let result = decode_payload(&payload, &header);
        assert!(matches!(
            result,
            Err(Error::CorruptionError(
                CorruptionError::FirstPositionMismatch {
                    expected: 1000,
                    found: 1005
                }
            ))
        ));
        Ok(())
    }

    #[test]
    fn test_trailing_bytes() -> Result<()> {
        let mut payload = Vec::new();
        write_i32(&mut payload, 0)?;
        payload.extend_from_slice(&[0, 0]);

        let header = BlockHeader::new(0, 1, 0);
        let result = decode_payload(&payload, &header);
        assert!(matches!(
            result,
            Err(Error::CorruptionError(CorruptionError::TrailingBytes(2)))
        ));
        Ok(())
    }

    #[test]
    fn test_negative_delta_in_payload() -> Result<()> {
        let mut payload = Vec::new();
        write_i32(&mut payload, 2)?;
        for delta in [0, -1] {
            write_i32(&mut payload, delta)?;
            write_str(&mut payload, "C")?;
            write_str(&mut payload, "T")?;
            write_str(&mut payload, "{}")?;
        }

        let header = BlockHeader::new(0, 50, 2);
        let result = decode_payload(&payload, &header);
        assert!(matches!(
            result,
            Err(Error::FormatError(FormatError::NegativeDelta {
                position: 50,
                delta: -1
            }))
        ));
        Ok(())
    }
}
