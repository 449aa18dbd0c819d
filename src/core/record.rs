use std::io;

use crate::{
    Result,
    varint::{decode_string, encoded_len, write_str},
};

/// One annotation entry at a genomic position
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AnnotationRecord {
    pub ref_allele: String,
    pub alt_allele: String,
    /// Annotation payload, typically a JSON object
    pub annotation: String,
}
impl AnnotationRecord {
    #[must_use]
    pub fn new(ref_allele: &str, alt_allele: &str, annotation: &str) -> Self {
        Self {
            ref_allele: ref_allele.to_string(),
            alt_allele: alt_allele.to_string(),
            annotation: annotation.to_string(),
        }
    }

    /// Writes the three length-prefixed strings in (ref, alt, annotation) order
    pub(crate) fn write<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        write_str(writer, &self.ref_allele)?;
        write_str(writer, &self.alt_allele)?;
        write_str(writer, &self.annotation)?;
        Ok(())
    }

    pub(crate) fn decode(bytes: &[u8], offset: &mut usize) -> Result<Self> {
        Ok(Self {
            ref_allele: decode_string(bytes, offset)?,
            alt_allele: decode_string(bytes, offset)?,
            annotation: decode_string(bytes, offset)?,
        })
    }

    /// Number of bytes the three length-prefixed strings occupy in a payload
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        [&self.ref_allele, &self.alt_allele, &self.annotation]
            .iter()
            .map(|s| encoded_len(s.len() as i32) + s.len())
            .sum()
    }

    /// Number of string bytes held by this record
    #[must_use]
    pub fn size(&self) -> usize {
        self.ref_allele.len() + self.alt_allele.len() + self.annotation.len()
    }
}
impl From<(&str, &str, &str)> for AnnotationRecord {
    fn from((ref_allele, alt_allele, annotation): (&str, &str, &str)) -> Self {
        Self::new(ref_allele, alt_allele, annotation)
    }
}
