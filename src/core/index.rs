use std::collections::HashMap;
use std::io::{self, SeekFrom};

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::{
    Chromosome, Result,
    error::{FormatError, NotFoundError},
};

use super::utils::{extension_read, read_exact_or_eos};
use super::{IndexHeader, SegmentEntry, StoreMetadata};

/// Location and coverage of one compressed block, stored in the index stream
///
/// This is stored identically in memory and on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Zeroable, Pod, Default)]
#[repr(C)]
pub struct BlockRange {
    /// Byte offset of the block header in the data stream
    pub(crate) offset: u64,

    /// Stored length of the block (header and payload)
    pub(crate) length: u32,

    /// Lowest position in the block
    pub(crate) first_position: i32,

    /// Highest position in the block
    pub(crate) last_position: i32,

    /// Number of records in the block
    pub(crate) num_records: u32,
}
impl BlockRange {
    #[must_use]
    pub fn new(
        offset: u64,
        length: u32,
        first_position: i32,
        last_position: i32,
        num_records: u32,
    ) -> Self {
        Self {
            offset,
            length,
            first_position,
            last_position,
            num_records,
        }
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub fn length(&self) -> u32 {
        self.length
    }

    #[must_use]
    pub fn first_position(&self) -> i32 {
        self.first_position
    }

    #[must_use]
    pub fn last_position(&self) -> i32 {
        self.last_position
    }

    #[must_use]
    pub fn num_records(&self) -> u32 {
        self.num_records
    }
}

/// The ordered block ranges of a single chromosome
///
/// Block `i` is responsible for positions `[first_i, first_{i+1})`; the last block
/// ends at its own last position.
#[derive(Clone, Debug, Default)]
pub struct Index {
    chrom_index: u16,
    ranges: Vec<BlockRange>,
}
impl Index {
    /// Builds an index, rejecting ranges that are unsorted or overlapping
    pub fn from_ranges(chrom_index: u16, ranges: Vec<BlockRange>) -> Result<Self> {
        for (entry, range) in ranges.iter().enumerate() {
            let unsorted = range.first_position > range.last_position
                || (entry > 0 && range.first_position <= ranges[entry - 1].last_position);
            if unsorted {
                return Err(FormatError::UnsortedIndex {
                    chrom_index: u32::from(chrom_index),
                    entry,
                }
                .into());
            }
        }
        Ok(Self {
            chrom_index,
            ranges,
        })
    }

    #[must_use]
    pub fn chrom_index(&self) -> u16 {
        self.chrom_index
    }

    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of records across all blocks
    #[must_use]
    pub fn num_records(&self) -> usize {
        self.ranges.iter().map(|r| r.num_records as usize).sum()
    }

    #[must_use]
    pub fn ranges(&self) -> &[BlockRange] {
        &self.ranges
    }

    /// First and last indexed position
    #[must_use]
    pub fn span(&self) -> Option<(i32, i32)> {
        Some((
            self.ranges.first()?.first_position,
            self.ranges.last()?.last_position,
        ))
    }

    /// All blocks whose interval intersects `[start, end]`, in position order
    #[must_use]
    pub fn blocks_for(&self, start: i32, end: i32) -> &[BlockRange] {
        let Some((_, last_position)) = self.span() else {
            return &[];
        };
        if start > end || start > last_position {
            return &[];
        }
        // last block starting at or before `start` (or the first block)
        let lo = self
            .ranges
            .partition_point(|r| r.first_position <= start)
            .saturating_sub(1);
        let hi = self.ranges.partition_point(|r| r.first_position <= end);
        if hi <= lo {
            return &[];
        }
        &self.ranges[lo..hi]
    }

    /// The block whose interval contains `position`
    ///
    /// Returns `None` when the position lies outside the indexed range.
    #[must_use]
    pub fn find(&self, position: i32) -> Option<BlockRange> {
        let (first_position, last_position) = self.span()?;
        if position < first_position || position > last_position {
            return None;
        }
        let idx = self.ranges.partition_point(|r| r.first_position <= position);
        Some(self.ranges[idx - 1])
    }
}

/// Reads the index stream: header and directory eagerly, segments on first use
pub struct IndexReader<R: io::Read + io::Seek> {
    inner: R,
    header: IndexHeader,
    metadata: StoreMetadata,
    directory: Vec<SegmentEntry>,

    /// Segments loaded so far
    loaded: HashMap<u16, Index>,
}
impl<R: io::Read + io::Seek> IndexReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        inner.seek(SeekFrom::Start(0))?;

        let mut header_buf = [0u8; size_of::<IndexHeader>()];
        read_exact_or_eos(&mut inner, &mut header_buf, "index header")?;
        let header = IndexHeader::from_bytes(&header_buf)?;

        let metadata = StoreMetadata::read_from(&mut inner)?;

        let mut directory_buf = Vec::new();
        extension_read(
            &mut inner,
            &mut directory_buf,
            header.num_segments as usize * size_of::<SegmentEntry>(),
            "index directory",
        )?;
        let directory = directory_buf
            .chunks_exact(size_of::<SegmentEntry>())
            .map(bytemuck::pod_read_unaligned::<SegmentEntry>)
            .collect();

        Ok(Self {
            inner,
            header,
            metadata,
            directory,
            loaded: HashMap::new(),
        })
    }

    #[must_use]
    pub fn header(&self) -> IndexHeader {
        self.header
    }

    #[must_use]
    pub fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn directory(&self) -> &[SegmentEntry] {
        &self.directory
    }

    /// Whether the directory lists a segment for `chrom_index`
    #[must_use]
    pub fn has_segment(&self, chrom_index: u16) -> bool {
        self.segment_entry(chrom_index).is_some()
    }

    fn segment_entry(&self, chrom_index: u16) -> Option<SegmentEntry> {
        self.directory
            .iter()
            .find(|e| e.chrom_index == u32::from(chrom_index))
            .copied()
    }

    /// Returns the index for `chrom_index`, loading its segment on first access
    ///
    /// `Ok(None)` means the store holds no blocks for that chromosome.
    pub fn get(&mut self, chrom_index: u16) -> Result<Option<&Index>> {
        if !self.loaded.contains_key(&chrom_index) {
            let Some(entry) = self.segment_entry(chrom_index) else {
                return Ok(None);
            };
            let index = self.read_segment(chrom_index, entry)?;
            debug!(
                chrom_index,
                num_blocks = index.num_blocks(),
                "loaded index segment"
            );
            self.loaded.insert(chrom_index, index);
        }
        Ok(self.loaded.get(&chrom_index))
    }

    /// Like [`get`](Self::get), but a missing segment is a [`NotFoundError`]
    pub fn require(&mut self, chromosome: &Chromosome) -> Result<&Index> {
        match self.get(chromosome.index)? {
            Some(index) => Ok(index),
            None => Err(NotFoundError::Chromosome(chromosome.ucsc_name.clone()).into()),
        }
    }

    fn read_segment(&mut self, chrom_index: u16, entry: SegmentEntry) -> Result<Index> {
        self.inner.seek(SeekFrom::Start(entry.offset))?;
        let mut segment_buf = Vec::new();
        extension_read(
            &mut self.inner,
            &mut segment_buf,
            entry.num_blocks as usize * size_of::<BlockRange>(),
            "index segment",
        )?;
        let ranges = segment_buf
            .chunks_exact(size_of::<BlockRange>())
            .map(bytemuck::pod_read_unaligned::<BlockRange>)
            .collect();
        Index::from_ranges(chrom_index, ranges)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writes a complete index stream
///
/// `segments` pairs each chromosome ordinal with its block ranges in position order.
pub fn write_index<W: io::Write>(
    writer: &mut W,
    metadata: &StoreMetadata,
    segments: &[(u16, Vec<BlockRange>)],
) -> Result<()> {
    let mut metadata_buf = Vec::new();
    metadata.write(&mut metadata_buf)?;

    let header = IndexHeader::new(segments.len() as u32);

    // segments follow the directory
    let mut offset = (size_of::<IndexHeader>()
        + metadata_buf.len()
        + segments.len() * size_of::<SegmentEntry>()) as u64;
    let directory = segments
        .iter()
        .map(|(chrom_index, ranges)| {
            let entry = SegmentEntry::new(u32::from(*chrom_index), ranges.len() as u32, offset);
            offset += (ranges.len() * size_of::<BlockRange>()) as u64;
            entry
        })
        .collect::<Vec<_>>();

    writer.write_all(header.as_bytes())?;
    writer.write_all(&metadata_buf)?;
    writer.write_all(bytemuck::cast_slice(&directory))?;
    for (_, ranges) in segments {
        writer.write_all(bytemuck::cast_slice(ranges))?;
    }
    Ok(())
}
