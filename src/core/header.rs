use std::io;

use bytemuck::{Pod, Zeroable};

use crate::{
    Result,
    error::FormatError,
    varint::{read_string, write_str},
};

use super::utils::read_flag;
use super::{DATA_MAGIC, FILE_VERSION, INDEX_MAGIC, INDEX_SCHEMA_VERSION};

/// Leading bytes of the data stream
///
/// This is stored identically in memory and on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct FileHeader {
    /// File magic number
    magic: [u8; 7],
    /// File version number
    pub version: u8,
}
impl Default for FileHeader {
    fn default() -> Self {
        Self {
            magic: *DATA_MAGIC,
            version: FILE_VERSION,
        }
    }
}
impl FileHeader {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header: Self = bytemuck::pod_read_unaligned(bytes);
        if header.magic != *DATA_MAGIC {
            return Err(FormatError::InvalidMagicNumber {
                kind: "data",
                found: header.magic.to_vec(),
            }
            .into());
        }
        if header.version != FILE_VERSION {
            return Err(FormatError::UnsupportedVersion {
                kind: "data",
                found: u32::from(header.version),
            }
            .into());
        }
        Ok(header)
    }
}

/// Leading bytes of the index stream
///
/// This is stored identically in memory and on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct IndexHeader {
    /// Magic number identifying the index format
    magic: [u8; 8],

    /// Layout version of the index stream
    pub schema_version: u32,

    /// Number of per-chromosome segments in the directory
    pub num_segments: u32,
}
impl IndexHeader {
    #[must_use]
    pub fn new(num_segments: u32) -> Self {
        Self {
            magic: *INDEX_MAGIC,
            schema_version: INDEX_SCHEMA_VERSION,
            num_segments,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header: Self = bytemuck::pod_read_unaligned(bytes);
        if header.magic != *INDEX_MAGIC {
            return Err(FormatError::InvalidMagicNumber {
                kind: "index",
                found: header.magic.to_vec(),
            }
            .into());
        }
        if header.schema_version != INDEX_SCHEMA_VERSION {
            return Err(FormatError::UnsupportedVersion {
                kind: "index",
                found: header.schema_version,
            }
            .into());
        }
        Ok(header)
    }
}

/// Directory entry locating one chromosome's block ranges in the index stream
///
/// This is stored identically in memory and on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Zeroable, Pod, Default)]
#[repr(C)]
pub struct SegmentEntry {
    /// Ordinal of the chromosome this segment describes
    pub chrom_index: u32,
    /// Number of [`BlockRange`](crate::BlockRange)s in the segment
    pub num_blocks: u32,
    /// Absolute byte offset of the segment in the index stream
    pub offset: u64,
}
impl SegmentEntry {
    #[must_use]
    pub fn new(chrom_index: u32, num_blocks: u32, offset: u64) -> Self {
        Self {
            chrom_index,
            num_blocks,
            offset,
        }
    }
}

/// Provenance of the annotations held in a store
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataSourceVersion {
    pub name: String,
    pub version: String,
    pub release_date: String,
    pub description: String,
}
impl DataSourceVersion {
    #[must_use]
    pub fn new(name: &str, version: &str, release_date: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            release_date: release_date.to_string(),
            description: description.to_string(),
        }
    }
}

/// Store-wide metadata written after the [`IndexHeader`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreMetadata {
    /// Genome assembly the positions refer to
    pub assembly: String,
    /// Key under which annotations are emitted in JSON output
    pub json_key: String,
    /// Annotations apply only to the exact allele
    pub match_by_allele: bool,
    /// Each position may carry several annotation entries
    pub is_array: bool,
    /// Annotations are tied to positions rather than alleles
    pub is_positional: bool,
    pub version: DataSourceVersion,
}
impl Default for StoreMetadata {
    fn default() -> Self {
        Self {
            assembly: "GRCh38".to_string(),
            json_key: String::new(),
            match_by_allele: true,
            is_array: false,
            is_positional: false,
            version: DataSourceVersion::default(),
        }
    }
}
impl StoreMetadata {
    pub fn write<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        write_str(writer, &self.assembly)?;
        write_str(writer, &self.json_key)?;
        writer.write_all(&[
            u8::from(self.match_by_allele),
            u8::from(self.is_array),
            u8::from(self.is_positional),
        ])?;
        write_str(writer, &self.version.name)?;
        write_str(writer, &self.version.version)?;
        write_str(writer, &self.version.release_date)?;
        write_str(writer, &self.version.description)?;
        Ok(())
    }

    pub fn read_from<R: io::Read>(reader: &mut R) -> Result<Self> {
        let assembly = read_string(reader)?;
        let json_key = read_string(reader)?;
        let match_by_allele = read_flag(reader, "match_by_allele")?;
        let is_array = read_flag(reader, "is_array")?;
        let is_positional = read_flag(reader, "is_positional")?;
        let version = DataSourceVersion {
            name: read_string(reader)?,
            version: read_string(reader)?,
            release_date: read_string(reader)?,
            description: read_string(reader)?,
        };
        Ok(Self {
            assembly,
            json_key,
            match_by_allele,
            is_array,
            is_positional,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_header_sizes() {
        assert_eq!(size_of::<FileHeader>(), 8);
        assert_eq!(size_of::<IndexHeader>(), 16);
        assert_eq!(size_of::<SegmentEntry>(), 16);
    }

    #[test]
    fn test_file_header_bytes() -> Result<()> {
        let header = FileHeader::default();
        let parsed = FileHeader::from_bytes(header.as_bytes())?;
        assert_eq!(parsed, header);
        assert_eq!(&header.as_bytes()[..7], DATA_MAGIC);
        Ok(())
    }

    #[test]
    fn test_file_header_bad_magic() {
        let result = FileHeader::from_bytes(b"CBQFILE\x01");
        assert!(matches!(
            result,
            Err(Error::FormatError(FormatError::InvalidMagicNumber { .. }))
        ));
    }

    #[test]
    fn test_file_header_bad_version() {
        let mut bytes = FileHeader::default().as_bytes().to_vec();
        bytes[7] = FILE_VERSION + 1;
        let result = FileHeader::from_bytes(&bytes);
        assert!(matches!(
            result,
            Err(Error::FormatError(FormatError::UnsupportedVersion { .. }))
        ));
    }

    #[test]
    fn test_index_header_bytes() -> Result<()> {
        let header = IndexHeader::new(25);
        let parsed = IndexHeader::from_bytes(header.as_bytes())?;
        assert_eq!(parsed.num_segments, 25);
        assert_eq!(parsed.schema_version, INDEX_SCHEMA_VERSION);

        assert!(IndexHeader::from_bytes(&[0u8; 16]).is_err());
        Ok(())
    }

    #[test]
    fn test_metadata_round_trip() -> Result<()> {
        let metadata = StoreMetadata {
            assembly: "GRCh38".to_string(),
            json_key: "clinvar".to_string(),
            match_by_allele: false,
            is_array: true,
            is_positional: false,
            version: DataSourceVersion::new("ClinVar", "20240101", "2024-01-01", "pathogenicity"),
        };
        let mut buf = Vec::new();
        metadata.write(&mut buf)?;

        let mut cursor = io::Cursor::new(&buf);
        let parsed = StoreMetadata::read_from(&mut cursor)?;
        assert_eq!(parsed, metadata);
        assert_eq!(cursor.position() as usize, buf.len());
        Ok(())
    }

    #[test]
    fn test_metadata_invalid_flag() -> Result<()> {
        let mut buf = Vec::new();
        write_str(&mut buf, "GRCh38")?;
        write_str(&mut buf, "key")?;
        buf.push(2);

        let result = StoreMetadata::read_from(&mut io::Cursor::new(&buf));
        assert!(matches!(
            result,
            Err(Error::FormatError(FormatError::InvalidFlag {
                field: "match_by_allele",
                value: 2
            }))
        ));
        Ok(())
    }
}
