use std::{
    fs,
    io::{self, SeekFrom},
    ops::RangeInclusive,
    path::Path,
};

use memmap2::Mmap;
use tracing::{debug, warn};

use crate::{
    AnnotationRecord, BlockHeader, BlockRange, Chromosome, Codec, CompressedBlock, DEFAULT_WINDOW_BYTES,
    FileHeader, IndexHeader, IndexReader, PositionedRecord, PreloadWindow, Result, StoreMetadata,
    ZstdCodec,
    core::utils::read_exact_or_eos,
    error::{CorruptionError, NotFoundError},
    index_path,
};

/// A reader over buffered data and index files
pub type FileReader = NsaReader<io::BufReader<fs::File>, io::BufReader<fs::File>>;

/// A reader over a memory-mapped data file and a buffered index file
pub type MmapReader = NsaReader<io::Cursor<Mmap>, io::BufReader<fs::File>>;

/// Configuration for an [`NsaReader`]
///
/// ```rust,no_run
/// use nsastore::ReaderBuilder;
///
/// let reader = ReaderBuilder::default()
///     .window_bytes(4 * 1024 * 1024)
///     .open("clinvar.nsa")
///     .unwrap();
/// ```
#[derive(Default, Clone, Copy, Debug)]
pub struct ReaderBuilder {
    /// Advisory budget for decompressed bytes per preload window
    window_bytes: Option<usize>,
    /// Skip corrupt blocks instead of failing the preload
    best_effort: Option<bool>,
}
impl ReaderBuilder {
    /// Sets the advisory budget for decompressed bytes held by one preload window
    ///
    /// Exceeding it never truncates a preload; the reader logs a warning so callers
    /// can choose smaller ranges.
    #[must_use]
    pub fn window_bytes(mut self, window_bytes: usize) -> Self {
        self.window_bytes = Some(window_bytes);
        self
    }

    /// Sets whether corrupt blocks are skipped (with a warning) rather than failing a preload
    #[must_use]
    pub fn best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = Some(best_effort);
        self
    }

    pub fn build<D, I>(self, data: D, index: I) -> Result<NsaReader<D, I>>
    where
        D: io::Read + io::Seek,
        I: io::Read + io::Seek,
    {
        self.build_with_codec(data, index, ZstdCodec::default())
    }

    pub fn build_with_codec<D, I, C>(self, data: D, index: I, codec: C) -> Result<NsaReader<D, I, C>>
    where
        D: io::Read + io::Seek,
        I: io::Read + io::Seek,
        C: Codec,
    {
        NsaReader::with_codec(
            data,
            index,
            codec,
            self.window_bytes.unwrap_or(DEFAULT_WINDOW_BYTES),
            self.best_effort.unwrap_or(false),
        )
    }

    /// Opens `path` and its companion index file as buffered streams
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<FileReader> {
        let data = fs::File::open(path.as_ref()).map(io::BufReader::new)?;
        let index = fs::File::open(index_path(path.as_ref())).map(io::BufReader::new)?;
        self.build(data, index)
    }

    /// Memory-maps `path` and opens its companion index file as a buffered stream
    pub fn open_mmap<P: AsRef<Path>>(self, path: P) -> Result<MmapReader> {
        let file = fs::File::open(path.as_ref())?;

        // Load the mmap
        let data = unsafe { Mmap::map(&file) }?;

        let index = fs::File::open(index_path(path.as_ref())).map(io::BufReader::new)?;
        self.build(io::Cursor::new(data), index)
    }
}

/// Random-access reader over a data stream of compressed blocks and its index stream
///
/// The reader owns both streams; dropping it releases them. Lookups go through a
/// [`PreloadWindow`]: [`preload`](Self::preload) materializes the blocks covering a
/// range, and [`annotations`](Self::annotations) answers point queries from it.
///
/// A single reader is not meant to be shared between threads. Independent readers
/// over the same files are fully independent.
pub struct NsaReader<D, I, C = ZstdCodec>
where
    D: io::Read + io::Seek,
    I: io::Read + io::Seek,
    C: Codec,
{
    data: D,
    header: FileHeader,
    index: IndexReader<I>,
    codec: C,

    window: PreloadWindow,
    window_bytes: usize,
    best_effort: bool,

    /// Reusable decompression buffer
    ubuf: Vec<u8>,
}
impl<D, I> NsaReader<D, I>
where
    D: io::Read + io::Seek,
    I: io::Read + io::Seek,
{
    /// Opens a reader with the default configuration
    pub fn new(data: D, index: I) -> Result<Self> {
        ReaderBuilder::default().build(data, index)
    }
}
impl FileReader {
    /// Opens `path` and `path.idx` with the default configuration
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        ReaderBuilder::default().open(path)
    }
}
impl MmapReader {
    /// Maps `path` and opens `path.idx` with the default configuration
    pub fn mmap<P: AsRef<Path>>(path: P) -> Result<Self> {
        ReaderBuilder::default().open_mmap(path)
    }
}
impl<D, I, C> NsaReader<D, I, C>
where
    D: io::Read + io::Seek,
    I: io::Read + io::Seek,
    C: Codec,
{
    fn with_codec(
        mut data: D,
        index: I,
        codec: C,
        window_bytes: usize,
        best_effort: bool,
    ) -> Result<Self> {
        data.seek(SeekFrom::Start(0))?;
        let mut header_buf = [0u8; size_of::<FileHeader>()];
        read_exact_or_eos(&mut data, &mut header_buf, "data header")?;
        let header = FileHeader::from_bytes(&header_buf)?;

        let index = IndexReader::new(index)?;

        Ok(Self {
            data,
            header,
            index,
            codec,
            window: PreloadWindow::new(),
            window_bytes,
            best_effort,
            ubuf: Vec::new(),
        })
    }

    #[must_use]
    pub fn header(&self) -> FileHeader {
        self.header
    }

    #[must_use]
    pub fn index_header(&self) -> IndexHeader {
        self.index.header()
    }

    #[must_use]
    pub fn metadata(&self) -> &StoreMetadata {
        self.index.metadata()
    }

    /// The current preload window
    #[must_use]
    pub fn window(&self) -> &PreloadWindow {
        &self.window
    }

    #[must_use]
    pub fn window_bytes(&self) -> usize {
        self.window_bytes
    }

    /// Whether the store holds any blocks for `chromosome`
    #[must_use]
    pub fn has_chromosome(&self, chromosome: &Chromosome) -> bool {
        self.index.has_segment(chromosome.index)
    }

    /// Rebuilds the preload window with every block intersecting `range`
    ///
    /// The previous window is always discarded. A chromosome without blocks yields
    /// an empty window. On failure the window is left empty.
    pub fn preload(&mut self, chromosome: &Chromosome, range: RangeInclusive<i32>) -> Result<()> {
        let (start, end) = range.into_inner();
        self.window.reset(chromosome.index, start, end);

        let ranges = match self.index.get(chromosome.index) {
            Ok(Some(index)) => index.blocks_for(start, end).to_vec(),
            Ok(None) => Vec::new(),
            Err(e) => {
                self.window.clear();
                return Err(e);
            }
        };

        for range in ranges {
            match self.load_block(chromosome, range) {
                Ok(()) => {}
                Err(e) if self.best_effort && e.is_corruption() => {
                    warn!(
                        chromosome = %chromosome.ucsc_name,
                        offset = range.offset,
                        error = %e,
                        "skipping corrupt block"
                    );
                }
                Err(e) => {
                    self.window.clear();
                    return Err(e);
                }
            }
        }

        debug!(
            chromosome = %chromosome.ucsc_name,
            start,
            end,
            records = self.window.len(),
            bytes = self.window.decompressed_bytes(),
            "preloaded window"
        );
        if self.window.decompressed_bytes() > self.window_bytes {
            warn!(
                chromosome = %chromosome.ucsc_name,
                start,
                end,
                bytes = self.window.decompressed_bytes(),
                budget = self.window_bytes,
                "preload window exceeds its byte budget"
            );
        }
        Ok(())
    }

    /// Preloads the range spanned by a sorted or unsorted list of positions
    ///
    /// An empty list leaves the reader with an empty window.
    pub fn preload_positions(&mut self, chromosome: &Chromosome, positions: &[i32]) -> Result<()> {
        let (Some(&start), Some(&end)) = (positions.iter().min(), positions.iter().max()) else {
            self.window.clear();
            return Ok(());
        };
        self.preload(chromosome, start..=end)
    }

    /// All records stored at `position`, in insertion order
    ///
    /// When the current window does not cover the position, the block containing it
    /// is preloaded first, replacing the window.
    pub fn annotations(
        &mut self,
        chromosome: &Chromosome,
        position: i32,
    ) -> Result<Vec<AnnotationRecord>> {
        if !self.window.covers(chromosome.index, position) {
            debug!(
                chromosome = %chromosome.ucsc_name,
                position,
                "position outside the preload window; reloading"
            );
            self.preload(chromosome, position..=position)?;
        }
        Ok(self.window.get(position).to_vec())
    }

    /// The block whose interval contains `position`
    pub fn find_block(&mut self, chromosome: &Chromosome, position: i32) -> Result<BlockRange> {
        self.index.require(chromosome)?.find(position).ok_or_else(|| {
            NotFoundError::Position {
                chromosome: chromosome.ucsc_name.clone(),
                position,
            }
            .into()
        })
    }

    /// Index entries of every block intersecting `[start, end]`, in position order
    pub fn blocks_for(
        &mut self,
        chromosome: &Chromosome,
        start: i32,
        end: i32,
    ) -> Result<Vec<BlockRange>> {
        Ok(self.index.require(chromosome)?.blocks_for(start, end).to_vec())
    }

    /// Every block of `chromosome` exactly as stored, without decompression
    pub fn compressed_blocks(&mut self, chromosome: &Chromosome) -> Result<Vec<CompressedBlock>> {
        let ranges = self.index.require(chromosome)?.ranges().to_vec();
        ranges
            .into_iter()
            .map(|range| {
                self.read_block(range)
                    .map_err(|e| e.in_block(&chromosome.ucsc_name, range.offset))
            })
            .collect()
    }

    /// Decompresses and parses a block obtained from [`compressed_blocks`](Self::compressed_blocks)
    pub fn decode_block(&mut self, block: &CompressedBlock) -> Result<Vec<PositionedRecord>> {
        block.decode(&mut self.codec, &mut self.ubuf)
    }

    /// Releases the underlying data and index streams
    pub fn into_inner(self) -> (D, I) {
        (self.data, self.index.into_inner())
    }

    fn load_block(&mut self, chromosome: &Chromosome, range: BlockRange) -> Result<()> {
        let records = match self.read_and_decode(range) {
            Ok(records) => records,
            Err(e) => return Err(e.in_block(&chromosome.ucsc_name, range.offset)),
        };
        self.window.insert_block(records, self.ubuf.len());
        self.window
            .extend_span(range.first_position, range.last_position);
        Ok(())
    }

    fn read_and_decode(&mut self, range: BlockRange) -> Result<Vec<PositionedRecord>> {
        let block = self.read_block(range)?;
        let records = block.decode(&mut self.codec, &mut self.ubuf)?;

        // records are sorted, so the last one bounds the rest
        if let Some(last) = records.last() {
            if last.position != range.last_position {
                return Err(CorruptionError::LastPositionMismatch {
                    expected: range.last_position,
                    found: last.position,
                }
                .into());
            }
        }
        Ok(records)
    }

    fn read_block(&mut self, range: BlockRange) -> Result<CompressedBlock> {
        self.data.seek(SeekFrom::Start(range.offset))?;

        // checked before the payload is read so a bad length never drives an allocation
        let header = BlockHeader::read_from(&mut self.data)?;
        if header.block_len() as u64 != u64::from(range.length) {
            return Err(CorruptionError::LengthMismatch {
                expected: u64::from(range.length),
                found: header.block_len() as u64,
            }
            .into());
        }

        // the header is outside the payload checksum
        if header.first_position != range.first_position {
            return Err(CorruptionError::FirstPositionMismatch {
                expected: range.first_position,
                found: header.first_position,
            }
            .into());
        }
        if header.num_records as u32 != range.num_records {
            return Err(CorruptionError::RecordCountMismatch {
                expected: range.num_records as i32,
                found: header.num_records,
            }
            .into());
        }
        CompressedBlock::read_payload(&mut self.data, header, range.offset)
    }
}
