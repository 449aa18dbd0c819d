mod block;
mod block_header;
mod header;
mod index;
mod record;
pub(crate) mod utils;

pub use block::{BlockBuilder, CompressedBlock, PositionedRecord};
pub use block_header::BlockHeader;
pub use header::{DataSourceVersion, FileHeader, IndexHeader, SegmentEntry, StoreMetadata};
pub use index::{BlockRange, Index, IndexReader, write_index};
pub use record::AnnotationRecord;

use super::{DATA_MAGIC, FILE_VERSION, INDEX_MAGIC, INDEX_SCHEMA_VERSION};
