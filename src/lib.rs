//! # NSA Store
//!
//! A compressed, block-indexed store for positional variant annotations.
//!
//! ## Overview
//!
//! Annotations are keyed by chromosome and one-based position. Each position may
//! carry several records, one per reference/alternate allele pair, each holding an
//! opaque annotation string (typically JSON).
//!
//! Records are grouped into position-sorted blocks, every block is ZSTD compressed
//! independently, and a companion index stream maps position intervals to block
//! offsets. A lookup therefore decompresses only the blocks it needs.
//!
//! ## File Structure
//!
//! A store is a pair of files: the data file and its index at `<data path>.idx`.
//!
//! ```text
//! data file                        index file
//! ┌───────────────────┐            ┌───────────────────┐
//! │    File Header    │ 8 bytes    │   Index Header    │ 16 bytes
//! ├───────────────────┤            ├───────────────────┤
//! │   Block Header    │ varints    │  Store Metadata   │ varints
//! ├───────────────────┤            ├───────────────────┤
//! │ Compressed Block  │ Variable   │ Segment Directory │ 16 bytes per chromosome
//! ├───────────────────┤            ├───────────────────┤
//! │       ...         │            │  Block Ranges     │ 24 bytes per block
//! └───────────────────┘            └───────────────────┘
//! ```
//!
//! Block headers and block payloads use the [`varint`] encoding throughout.
//! Index structures are fixed-width and read directly with `bytemuck`.
//!
//! ## Reading
//!
//! ```rust,no_run
//! use nsastore::{FileReader, ReferenceTable};
//!
//! let table = ReferenceTable::grch38();
//! let chr1 = table.get("chr1").unwrap();
//!
//! let mut reader = FileReader::from_path("clinvar.nsa").unwrap();
//! reader.preload(chr1, 1_000..=50_000).unwrap();
//! for record in reader.annotations(chr1, 1_000).unwrap() {
//!     println!("{}>{} {}", record.ref_allele, record.alt_allele, record.annotation);
//! }
//! ```

mod cache;
mod chrom;
mod codec;
mod core;
pub mod error;
mod read;
pub mod varint;
mod write;

use std::path::{Path, PathBuf};

pub use self::core::{
    AnnotationRecord, BlockBuilder, BlockHeader, BlockRange, CompressedBlock, DataSourceVersion,
    FileHeader, Index, IndexHeader, IndexReader, PositionedRecord, SegmentEntry, StoreMetadata,
    write_index,
};
pub use cache::PreloadWindow;
pub use chrom::{Chromosome, ReferenceTable};
pub use codec::{Codec, ZstdCodec};
pub use error::{Error, Result};
pub use read::{FileReader, MmapReader, NsaReader, ReaderBuilder};
pub use write::{FileWriter, NsaWriter, NsaWriterBuilder};

pub const DATA_MAGIC: &[u8; 7] = b"NSADATA";
pub const INDEX_MAGIC: &[u8; 8] = b"NSAINDEX";

pub const FILE_VERSION: u8 = 1;
pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// Extension appended to the data path to locate the index
pub const INDEX_SUFFIX: &str = ".idx";

/// Default target for uncompressed record bytes per block
pub const DEFAULT_BLOCK_SIZE: usize = 128 * 1024;
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Default advisory budget for decompressed bytes per preload window
pub const DEFAULT_WINDOW_BYTES: usize = 1024 * 1024;

/// Largest decompressed payload a block may declare
pub const MAX_BLOCK_BYTES: usize = 64 * 1024 * 1024;

/// Path of the index file belonging to the data file at `path`
#[must_use]
pub fn index_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut path = path.as_ref().as_os_str().to_owned();
    path.push(INDEX_SUFFIX);
    PathBuf::from(path)
}
