/// Custom Result type for NSA store operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the nsastore library, encompassing all possible error cases
/// that can occur while reading or writing an annotation store.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed bytes: truncated varints, bad magic numbers, invalid field values
    #[error("Format error: {0}")]
    FormatError(#[from] FormatError),

    /// Errors raised by the compression codec
    #[error("Codec error: {0}")]
    CodecError(#[from] CodecError),

    /// Decoded data disagrees with the block header or the index
    #[error("Data corruption: {0}")]
    CorruptionError(#[from] CorruptionError),

    /// The requested chromosome or position is not represented in the index
    #[error("Not found: {0}")]
    NotFoundError(#[from] NotFoundError),

    /// Errors that occur during write operations
    #[error("Error writing store: {0}")]
    WriteError(#[from] WriteError),

    /// Standard I/O errors
    #[error("Error with IO: {0}")]
    IoError(#[from] std::io::Error),

    /// A block-level failure annotated with the location of the bad block
    #[error("Error in block at offset {offset} on {chromosome}: {source}")]
    BlockError {
        chromosome: String,
        offset: u64,
        #[source]
        source: Box<Error>,
    },
}
impl Error {
    /// Wraps an error with the chromosome and data-stream offset of the block it came from
    #[must_use]
    pub fn in_block(self, chromosome: &str, offset: u64) -> Self {
        Self::BlockError {
            chromosome: chromosome.to_string(),
            offset,
            source: Box::new(self),
        }
    }

    /// Checks if the error is an expected lookup miss rather than a failure
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFoundError(_) => true,
            Self::BlockError { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Checks if the error means the stored bytes cannot be trusted
    ///
    /// Format, codec and corruption errors all qualify.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        match self {
            Self::FormatError(_) | Self::CodecError(_) | Self::CorruptionError(_) => true,
            Self::BlockError { source, .. } => source.is_corruption(),
            _ => false,
        }
    }
}

/// Errors raised while decoding the binary layout
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    /// A varint or fixed-width field ran past the end of the stream
    #[error("Unexpected end of stream while reading {0}")]
    UnexpectedEndOfStream(&'static str),

    /// A varint used more than five bytes or set bits above 32
    #[error("Malformed varint: too many continuation bytes")]
    MalformedVarint,

    /// A length prefix was negative
    #[error("Invalid length prefix: {0}")]
    NegativeLength(i32),

    /// A record position delta was negative
    #[error("Invalid position delta {delta} after position {position}")]
    NegativeDelta { position: i32, delta: i32 },

    /// A record position delta overflowed the coordinate space
    #[error("Position delta {delta} after position {position} overflows")]
    PositionOverflow { position: i32, delta: i32 },

    /// A string field did not contain valid UTF-8
    #[error("Invalid UTF-8 in string field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The magic number in the header does not match the expected value
    #[error("Invalid {kind} magic number: {found:?}")]
    InvalidMagicNumber { kind: &'static str, found: Vec<u8> },

    /// The format version in the header is not supported
    #[error("Unsupported {kind} version: {found}")]
    UnsupportedVersion { kind: &'static str, found: u32 },

    /// Index entries are out of order or overlap
    #[error("Index for chromosome {chrom_index} is not sorted at entry {entry}")]
    UnsortedIndex { chrom_index: u32, entry: usize },

    /// A boolean flag held a value other than 0 or 1
    #[error("Invalid flag value for {field}: {value}")]
    InvalidFlag { field: &'static str, value: u8 },
}

/// Errors raised by a [`Codec`](crate::Codec) implementation
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("Compression failed: {0}")]
    Compression(&'static str),

    #[error("Decompression failed: {0}")]
    Decompression(&'static str),

    /// The compressed frame does not record its decompressed size
    #[error("Compressed payload does not declare its decompressed size")]
    MissingContentSize,

    /// The declared decompressed size is larger than any valid block
    #[error("Declared decompressed size ({size}) exceeds the maximum block size ({max})")]
    ContentSizeTooLarge { size: u64, max: usize },

    /// The number of decompressed bytes differs from the expected length
    #[error("Decompressed {actual} bytes but expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Decoded data is internally consistent but disagrees with its header or index
#[derive(thiserror::Error, Debug)]
pub enum CorruptionError {
    #[error("Block header declares {expected} records but payload holds {found}")]
    RecordCountMismatch { expected: i32, found: i32 },

    #[error("Block header declares first position {expected} but first record is at {found}")]
    FirstPositionMismatch { expected: i32, found: i32 },

    #[error("Index declares last position {expected} but last record is at {found}")]
    LastPositionMismatch { expected: i32, found: i32 },

    #[error("Index declares block length {expected} but block occupies {found} bytes")]
    LengthMismatch { expected: u64, found: u64 },

    #[error("{0} unread bytes after the last record")]
    TrailingBytes(usize),

    #[error("Block header declares an invalid compressed length: {0}")]
    InvalidCompressedLength(i32),
}

/// Lookup misses
#[derive(thiserror::Error, Debug)]
pub enum NotFoundError {
    #[error("No index segment for chromosome {0}")]
    Chromosome(String),

    #[error("Position {position} is outside the indexed range of {chromosome}")]
    Position { chromosome: String, position: i32 },

    #[error("Unknown chromosome name: {0}")]
    UnknownChromosome(String),
}

/// Errors that can occur while writing a store
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    /// Records must arrive sorted by chromosome then position
    #[error("Record at {chromosome}:{position} arrived after {prev_chromosome}:{prev_position}")]
    Unsorted {
        chromosome: String,
        position: i32,
        prev_chromosome: String,
        prev_position: i32,
    },

    #[error("Position {position} is outside [1, {length}] for {chromosome}")]
    PositionOutOfRange {
        chromosome: String,
        position: i32,
        length: u32,
    },

    #[error("Block size must be between 1 and {max} bytes, got {0}", max = crate::MAX_BLOCK_BYTES)]
    InvalidBlockSize(usize),

    /// The records of one block would decompress to more than the reader accepts
    #[error("Block payload of {size} bytes exceeds the maximum block size ({max})")]
    BlockTooLarge { size: usize, max: usize },

    /// Attempted to push after the index was written
    #[error("Writer has already been finished")]
    AlreadyFinished,
}

#[cfg(test)]
mod testing {
    use super::*;

    // ==================== Classification Tests ====================

    #[test]
    fn test_not_found_is_not_corruption() {
        let error: Error = NotFoundError::Chromosome("chr1".to_string()).into();
        assert!(error.is_not_found());
        assert!(!error.is_corruption());
    }

    #[test]
    fn test_corruption_classification() {
        let error: Error = CorruptionError::RecordCountMismatch {
            expected: 2,
            found: 3,
        }
        .into();
        assert!(error.is_corruption());
        assert!(!error.is_not_found());

        let error: Error = FormatError::UnexpectedEndOfStream("varint").into();
        assert!(error.is_corruption());

        let error: Error = CodecError::Decompression("Unknown frame descriptor").into();
        assert!(error.is_corruption());
    }

    #[test]
    fn test_io_is_neither() {
        let error: Error = std::io::Error::other("disk gone").into();
        assert!(!error.is_corruption());
        assert!(!error.is_not_found());
    }

    #[test]
    fn test_block_context_is_transparent() {
        let error: Error = CorruptionError::TrailingBytes(4).into();
        let error = error.in_block("chr7", 4096);
        assert!(error.is_corruption());

        let error_str = format!("{error}");
        assert!(error_str.contains("chr7"));
        assert!(error_str.contains("4096"));
        assert!(error_str.contains("4 unread bytes"));
    }

    // ==================== Display Tests ====================

    #[test]
    fn test_record_count_mismatch_display() {
        let error = CorruptionError::RecordCountMismatch {
            expected: 10,
            found: 12,
        };
        let error_str = format!("{error}");
        assert!(error_str.contains("10"));
        assert!(error_str.contains("12"));
    }

    #[test]
    fn test_position_not_found_display() {
        let error = NotFoundError::Position {
            chromosome: "chrX".to_string(),
            position: 200_000_000,
        };
        let error_str = format!("{error}");
        assert!(error_str.contains("chrX"));
        assert!(error_str.contains("200000000"));
    }

    #[test]
    fn test_write_unsorted_display() {
        let error = WriteError::Unsorted {
            chromosome: "chr1".to_string(),
            position: 5,
            prev_chromosome: "chr1".to_string(),
            prev_position: 10,
        };
        let error_str = format!("{error}");
        assert!(error_str.contains("chr1:5"));
        assert!(error_str.contains("chr1:10"));
    }

    #[test]
    fn test_error_from_conversions() {
        let error: Error = WriteError::AlreadyFinished.into();
        assert!(matches!(error, Error::WriteError(_)));

        let error: Error = CodecError::MissingContentSize.into();
        assert!(matches!(error, Error::CodecError(_)));

        let error: Error = NotFoundError::UnknownChromosome("chr99".into()).into();
        assert!(matches!(error, Error::NotFoundError(_)));
    }
}
