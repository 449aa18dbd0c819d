//! Writer implementation for NSA stores
//!
//! Records arrive sorted by chromosome ordinal, then by position. The writer packs
//! them into [`CompressedBlock`](crate::CompressedBlock)s of roughly `block_size`
//! uncompressed bytes, appends each block to the data stream as soon as it is sealed,
//! and collects one [`BlockRange`] per block. [`NsaWriter::finish`] writes the
//! collected ranges as the index stream.
//!
//! A block only closes at a position boundary, so all records of one position live in
//! the same block and block intervals never overlap.
//!
//! ```rust,no_run
//! use nsastore::{AnnotationRecord, NsaWriterBuilder, ReferenceTable};
//!
//! let table = ReferenceTable::grch38();
//! let mut writer = NsaWriterBuilder::default()
//!     .block_size(64 * 1024)
//!     .create("clinvar.nsa")
//!     .unwrap();
//!
//! let chr1 = table.get("chr1").unwrap();
//! writer
//!     .push(chr1, 1000, &AnnotationRecord::new("A", "G", "{\"id\":1}"))
//!     .unwrap();
//! writer.finish().unwrap();
//! ```

use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use tracing::{debug, trace};

use crate::{
    AnnotationRecord, BlockBuilder, BlockRange, Chromosome, Codec, DEFAULT_BLOCK_SIZE,
    DEFAULT_COMPRESSION_LEVEL, FileHeader, MAX_BLOCK_BYTES, Result, StoreMetadata, ZstdCodec, error::WriteError,
    index_path, write_index,
};

/// A writer over buffered data and index files
pub type FileWriter = NsaWriter<io::BufWriter<fs::File>, io::BufWriter<fs::File>>;

/// Configuration for an [`NsaWriter`]
#[derive(Default, Clone)]
pub struct NsaWriterBuilder {
    /// Target uncompressed bytes per block
    block_size: Option<usize>,
    /// Zstd compression level
    compression_level: Option<i32>,
    /// Store-wide metadata written to the index
    metadata: Option<StoreMetadata>,
}
impl NsaWriterBuilder {
    /// Sets the target number of uncompressed record bytes per block
    ///
    /// A block is sealed at the first position boundary after it reaches this size.
    /// Smaller blocks make point lookups cheaper; larger blocks compress better.
    #[must_use]
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = Some(block_size);
        self
    }

    #[must_use]
    pub fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = Some(level);
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: StoreMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn build<D: Write, I: Write>(self, data: D, index: I) -> Result<NsaWriter<D, I>> {
        let codec = ZstdCodec::new(self.compression_level.unwrap_or(DEFAULT_COMPRESSION_LEVEL));
        self.build_with_codec(data, index, codec)
    }

    pub fn build_with_codec<D: Write, I: Write, C: Codec>(
        self,
        data: D,
        index: I,
        codec: C,
    ) -> Result<NsaWriter<D, I, C>> {
        NsaWriter::new(
            data,
            index,
            codec,
            self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE),
            self.metadata.unwrap_or_default(),
        )
    }

    /// Creates `path` and `path.idx`, truncating existing files
    pub fn create<P: AsRef<Path>>(self, path: P) -> Result<FileWriter> {
        let data = fs::File::create(path.as_ref()).map(io::BufWriter::new)?;
        let index = fs::File::create(index_path(path.as_ref())).map(io::BufWriter::new)?;
        self.build(data, index)
    }
}

/// Writer producing a data stream and its index stream
///
/// Nothing is written to the index stream until [`finish`](Self::finish) is called;
/// a writer dropped before that leaves an unusable store.
pub struct NsaWriter<D: Write, I: Write, C: Codec = ZstdCodec> {
    data: D,
    index: I,
    codec: C,
    metadata: StoreMetadata,

    /// Target uncompressed bytes per block
    block_size: usize,

    /// Records of the block being filled
    block: BlockBuilder,

    /// Chromosome and position of the last accepted record
    last: Option<(Chromosome, i32)>,

    /// Block ranges of the chromosome being written
    ranges: Vec<BlockRange>,

    /// Completed per-chromosome segments
    segments: Vec<(u16, Vec<BlockRange>)>,

    /// Total bytes written to the data stream
    bytes_written: u64,

    /// Total records written
    records_written: usize,

    finished: bool,
}
impl<D: Write, I: Write, C: Codec> NsaWriter<D, I, C> {
    fn new(
        mut data: D,
        index: I,
        codec: C,
        block_size: usize,
        metadata: StoreMetadata,
    ) -> Result<Self> {
        if block_size == 0 || block_size > MAX_BLOCK_BYTES {
            return Err(WriteError::InvalidBlockSize(block_size).into());
        }
        let header = FileHeader::default();
        data.write_all(header.as_bytes())?;
        Ok(Self {
            data,
            index,
            codec,
            metadata,
            block_size,
            block: BlockBuilder::new(),
            last: None,
            ranges: Vec::new(),
            segments: Vec::new(),
            bytes_written: header.as_bytes().len() as u64,
            records_written: 0,
            finished: false,
        })
    }

    #[must_use]
    pub fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Total bytes written to the data stream so far
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Total records accepted so far
    #[must_use]
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Appends one record at `position` of `chromosome`
    pub fn push(
        &mut self,
        chromosome: &Chromosome,
        position: i32,
        record: &AnnotationRecord,
    ) -> Result<()> {
        if self.finished {
            return Err(WriteError::AlreadyFinished.into());
        }
        if !chromosome.contains(position) {
            return Err(WriteError::PositionOutOfRange {
                chromosome: chromosome.ucsc_name.clone(),
                position,
                length: chromosome.length,
            }
            .into());
        }

        let (new_chromosome, new_position) = match &self.last {
            Some((prev, prev_position)) => {
                if chromosome.index < prev.index
                    || (chromosome.index == prev.index && position < *prev_position)
                {
                    return Err(WriteError::Unsorted {
                        chromosome: chromosome.ucsc_name.clone(),
                        position,
                        prev_chromosome: prev.ucsc_name.clone(),
                        prev_position: *prev_position,
                    }
                    .into());
                }
                (chromosome.index != prev.index, position != *prev_position)
            }
            None => (false, false),
        };
        if new_chromosome {
            self.flush_block()?;
            self.close_segment();
        } else if new_position
            && (self.block.size() >= self.block_size || !self.block.fits(record))
        {
            self.flush_block()?;
        }

        self.block.push(position, record)?;
        self.records_written += 1;
        match &mut self.last {
            Some((prev, prev_position)) if prev.index == chromosome.index => {
                *prev_position = position;
            }
            last => *last = Some((chromosome.clone(), position)),
        }
        Ok(())
    }

    /// Seals the pending block, writes the index stream, and flushes both sinks
    ///
    /// Calling it more than once has no further effect.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.flush_block()?;
        self.close_segment();
        self.data.flush()?;

        write_index(&mut self.index, &self.metadata, &self.segments)?;
        self.index.flush()?;
        self.finished = true;

        debug!(
            segments = self.segments.len(),
            records = self.records_written,
            bytes = self.bytes_written,
            "finished store"
        );
        Ok(())
    }

    /// Releases the underlying data and index sinks
    pub fn into_inner(self) -> (D, I) {
        (self.data, self.index)
    }

    fn flush_block(&mut self) -> Result<()> {
        let Some(range) =
            self.block
                .flush_to(&mut self.data, &mut self.codec, self.bytes_written)?
        else {
            return Ok(());
        };
        trace!(
            offset = range.offset(),
            length = range.length(),
            records = range.num_records(),
            "wrote block"
        );
        self.bytes_written += u64::from(range.length());
        self.ranges.push(range);
        Ok(())
    }

    fn close_segment(&mut self) {
        if self.ranges.is_empty() {
            return;
        }
        if let Some((chromosome, _)) = &self.last {
            self.segments
                .push((chromosome.index, std::mem::take(&mut self.ranges)));
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    use super::*;
    use crate::{DataSourceVersion, Error, IndexReader, NsaReader, ReferenceTable};

    fn record(alt: &str, id: usize) -> AnnotationRecord {
        AnnotationRecord::new("A", alt, &format!("{{\"id\":{id}}}"))
    }

    fn writer(block_size: usize) -> Result<NsaWriter<Vec<u8>, Vec<u8>>> {
        NsaWriterBuilder::default()
            .block_size(block_size)
            .build(Vec::new(), Vec::new())
    }

    #[test]
    fn test_zero_block_size() {
        let result = writer(0);
        assert!(matches!(
            result,
            Err(Error::WriteError(WriteError::InvalidBlockSize(0)))
        ));
    }

    #[test]
    fn test_block_size_above_limit() {
        let result = writer(MAX_BLOCK_BYTES + 1);
        assert!(matches!(
            result,
            Err(Error::WriteError(WriteError::InvalidBlockSize(_)))
        ));
        assert!(writer(MAX_BLOCK_BYTES).is_ok());
    }

    #[test]
    fn test_record_larger_than_any_block() -> Result<()> {
        let table = ReferenceTable::grch38();
        let chr1 = table.get("chr1")?;
        let mut writer = writer(1024)?;
        writer.push(chr1, 10, &record("G", 0))?;

        let huge = AnnotationRecord::new("A", "T", &"x".repeat(70 * 1024 * 1024));
        let result = writer.push(chr1, 20, &huge);
        assert!(matches!(
            result,
            Err(Error::WriteError(WriteError::BlockTooLarge { .. }))
        ));

        // everything accepted so far still reads back
        writer.finish()?;
        let (data, index) = writer.into_inner();
        let mut reader = NsaReader::new(io::Cursor::new(data), io::Cursor::new(index))?;
        assert_eq!(reader.annotations(chr1, 10)?, vec![record("G", 0)]);
        assert!(reader.annotations(chr1, 20)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_empty_store() -> Result<()> {
        let mut writer = writer(1024)?;
        writer.finish()?;
        let (data, index) = writer.into_inner();
        assert_eq!(data.len(), size_of::<FileHeader>());

        let index = IndexReader::new(io::Cursor::new(index))?;
        assert_eq!(index.header().num_segments, 0);
        Ok(())
    }

    #[test]
    fn test_unsorted_positions() -> Result<()> {
        let table = ReferenceTable::grch38();
        let chr1 = table.get("chr1")?;
        let mut writer = writer(1024)?;
        writer.push(chr1, 100, &record("G", 0))?;
        writer.push(chr1, 100, &record("T", 1))?;

        let result = writer.push(chr1, 99, &record("G", 2));
        assert!(matches!(
            result,
            Err(Error::WriteError(WriteError::Unsorted {
                position: 99,
                prev_position: 100,
                ..
            }))
        ));
        Ok(())
    }

    #[test]
    fn test_unsorted_chromosomes() -> Result<()> {
        let table = ReferenceTable::grch38();
        let mut writer = writer(1024)?;
        writer.push(table.get("chr2")?, 100, &record("G", 0))?;
        let result = writer.push(table.get("chr1")?, 500, &record("G", 1));
        assert!(matches!(
            result,
            Err(Error::WriteError(WriteError::Unsorted { .. }))
        ));

        // a later chromosome may restart at any position
        writer.push(table.get("chr3")?, 1, &record("G", 2))?;
        Ok(())
    }

    #[test]
    fn test_position_out_of_range() -> Result<()> {
        let table = ReferenceTable::grch38();
        let chr21 = table.get("chr21")?;
        let mut writer = writer(1024)?;
        for position in [0, -5, chr21.length as i32 + 1] {
            let result = writer.push(chr21, position, &record("G", 0));
            assert!(matches!(
                result,
                Err(Error::WriteError(WriteError::PositionOutOfRange { .. }))
            ));
        }
        writer.push(chr21, chr21.length as i32, &record("G", 0))?;
        Ok(())
    }

    #[test]
    fn test_push_after_finish() -> Result<()> {
        let table = ReferenceTable::grch38();
        let chr1 = table.get("chr1")?;
        let mut writer = writer(1024)?;
        writer.push(chr1, 10, &record("G", 0))?;
        writer.finish()?;
        writer.finish()?;

        let result = writer.push(chr1, 20, &record("G", 1));
        assert!(matches!(
            result,
            Err(Error::WriteError(WriteError::AlreadyFinished))
        ));
        Ok(())
    }

    #[test]
    fn test_blocks_split_at_position_boundaries() -> Result<()> {
        let table = ReferenceTable::grch38();
        let chr1 = table.get("chr1")?;
        let mut rng = SmallRng::seed_from_u64(42);

        // a tiny block size forces a flush at nearly every boundary
        let mut writer = writer(16)?;
        let mut position = 1;
        let mut expected = 0;
        for i in 0..2_000 {
            if rng.random_bool(0.3) {
                position += rng.random_range(1..50);
            }
            writer.push(chr1, position, &record("G", i))?;
            expected += 1;
        }
        writer.finish()?;
        assert_eq!(writer.records_written(), expected);
        let (data, index) = writer.into_inner();

        let mut reader = NsaReader::new(io::Cursor::new(data), io::Cursor::new(index))?;
        let ranges = reader.blocks_for(chr1, 1, i32::MAX)?;
        assert!(ranges.len() > 10);

        let mut total = 0;
        for pair in ranges.windows(2) {
            // same position never straddles two blocks
            assert!(pair[0].last_position() < pair[1].first_position());
            assert_eq!(
                pair[0].offset() + u64::from(pair[0].length()),
                pair[1].offset()
            );
        }
        for block in reader.compressed_blocks(chr1)? {
            total += reader.decode_block(&block)?.len();
        }
        assert_eq!(total, expected);
        Ok(())
    }

    #[test]
    fn test_segments_per_chromosome() -> Result<()> {
        let table = ReferenceTable::grch38();
        let mut writer = writer(1024)?;
        for (i, name) in ["chr1", "chr7", "chrX"].into_iter().enumerate() {
            let chromosome = table.get(name)?;
            for position in 1..=100 {
                writer.push(chromosome, position * 10, &record("C", i))?;
            }
        }
        writer.finish()?;
        let (data, index) = writer.into_inner();
        let data_len = data.len() as u64;

        let mut index = IndexReader::new(io::Cursor::new(index))?;
        assert_eq!(index.header().num_segments, 3);
        assert!(!index.has_segment(table.get("chr2")?.index));

        let mut end = size_of::<FileHeader>() as u64;
        for name in ["chr1", "chr7", "chrX"] {
            let segment = index.require(table.get(name)?)?;
            assert_eq!(segment.num_records(), 100);
            assert_eq!(segment.span(), Some((10, 1000)));
            for range in segment.ranges() {
                assert_eq!(range.offset(), end);
                end += u64::from(range.length());
            }
        }
        assert_eq!(end, data_len);
        Ok(())
    }

    #[test]
    fn test_metadata_reaches_index() -> Result<()> {
        let metadata = StoreMetadata {
            json_key: "clinvar".to_string(),
            is_array: true,
            version: DataSourceVersion::new("ClinVar", "20240101", "2024-01-01", ""),
            ..StoreMetadata::default()
        };
        let mut writer = NsaWriterBuilder::default()
            .metadata(metadata.clone())
            .compression_level(19)
            .build(Vec::new(), Vec::new())?;
        writer.finish()?;
        let (data, index) = writer.into_inner();

        let reader = NsaReader::new(io::Cursor::new(data), io::Cursor::new(index))?;
        assert_eq!(reader.metadata(), &metadata);
        Ok(())
    }

    #[test]
    fn test_create_writes_both_files() -> Result<()> {
        let table = ReferenceTable::grch38();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store.nsa");

        let mut writer = NsaWriterBuilder::default().create(&path)?;
        writer.push(table.get("chr1")?, 1000, &record("G", 1))?;
        writer.finish()?;
        drop(writer);

        assert!(path.exists());
        assert!(index_path(&path).exists());
        Ok(())
    }
}
