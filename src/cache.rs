//! The preload window
//!
//! A window holds every decoded record of the blocks needed to cover one
//! requested range of one chromosome. It is rebuilt from scratch by each
//! preload; there is no eviction beyond full replacement.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::{AnnotationRecord, PositionedRecord};

#[derive(Clone, Debug, Default)]
pub struct PreloadWindow {
    /// Chromosome the window was built for, `None` when nothing is loaded
    chrom_index: Option<u16>,

    /// Positions the window is authoritative for
    start: i32,
    end: i32,

    records: BTreeMap<i32, Vec<AnnotationRecord>>,
    num_records: usize,

    /// Decompressed payload bytes that went into the window
    decompressed_bytes: usize,
}
impl PreloadWindow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards all content and starts a window over `[start, end]` of `chrom_index`
    pub(crate) fn reset(&mut self, chrom_index: u16, start: i32, end: i32) {
        self.clear();
        self.chrom_index = Some(chrom_index);
        self.start = start;
        self.end = end;
    }

    /// Discards all content; the window covers nothing afterwards
    pub fn clear(&mut self) {
        self.chrom_index = None;
        self.start = 0;
        self.end = -1;
        self.records.clear();
        self.num_records = 0;
        self.decompressed_bytes = 0;
    }

    /// Widens the covered range to include a fully loaded block
    pub(crate) fn extend_span(&mut self, first_position: i32, last_position: i32) {
        self.start = self.start.min(first_position);
        self.end = self.end.max(last_position);
    }

    /// Adds the decoded records of one block, keeping their order
    pub(crate) fn insert_block(&mut self, records: Vec<PositionedRecord>, decompressed_bytes: usize) {
        self.num_records += records.len();
        self.decompressed_bytes += decompressed_bytes;
        for PositionedRecord { position, record } in records {
            self.records.entry(position).or_default().push(record);
        }
    }

    /// Whether a lookup of `position` on `chrom_index` can be answered from the window
    #[must_use]
    pub fn covers(&self, chrom_index: u16, position: i32) -> bool {
        self.chrom_index == Some(chrom_index) && self.start <= position && position <= self.end
    }

    /// Records stored at `position`, in insertion order
    #[must_use]
    pub fn get(&self, position: i32) -> &[AnnotationRecord] {
        self.records
            .get(&position)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Iterates positions with at least one record, in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (i32, &[AnnotationRecord])> {
        self.records.iter().map(|(p, r)| (*p, r.as_slice()))
    }

    #[must_use]
    pub fn chrom_index(&self) -> Option<u16> {
        self.chrom_index
    }

    /// The covered position range
    #[must_use]
    pub fn range(&self) -> Option<RangeInclusive<i32>> {
        self.chrom_index.map(|_| self.start..=self.end)
    }

    /// Number of records held
    #[must_use]
    pub fn len(&self) -> usize {
        self.num_records
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_records == 0
    }

    /// Number of distinct positions held
    #[must_use]
    pub fn num_positions(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn decompressed_bytes(&self) -> usize {
        self.decompressed_bytes
    }
}
