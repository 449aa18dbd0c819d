use std::collections::HashMap;

use crate::{Result, error::NotFoundError};

/// A reference sequence the store can address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chromosome {
    /// UCSC style display name (`chr1`)
    pub ucsc_name: String,
    /// Ensembl style name (`1`)
    pub ensembl_name: String,
    /// RefSeq accession (`NC_000001.11`)
    pub accession: String,
    /// Total length in bases
    pub length: u32,
    /// Zero-based ordinal used to address index segments
    pub index: u16,
}
impl Chromosome {
    #[must_use]
    pub fn new(ucsc_name: &str, ensembl_name: &str, accession: &str, length: u32, index: u16) -> Self {
        Self {
            ucsc_name: ucsc_name.to_string(),
            ensembl_name: ensembl_name.to_string(),
            accession: accession.to_string(),
            length,
            index,
        }
    }

    /// Whether `position` is a valid one-based coordinate on this chromosome
    #[must_use]
    pub fn contains(&self, position: i32) -> bool {
        position >= 1 && i64::from(position) <= i64::from(self.length)
    }
}

/// GRCh38 primary assembly: (UCSC, Ensembl, RefSeq, length)
const GRCH38: [(&str, &str, &str, u32); 25] = [
    ("chr1", "1", "NC_000001.11", 248_956_422),
    ("chr2", "2", "NC_000002.12", 242_193_529),
    ("chr3", "3", "NC_000003.12", 198_295_559),
    ("chr4", "4", "NC_000004.12", 190_214_555),
    ("chr5", "5", "NC_000005.10", 181_538_259),
    ("chr6", "6", "NC_000006.12", 170_805_979),
    ("chr7", "7", "NC_000007.14", 159_345_973),
    ("chr8", "8", "NC_000008.11", 145_138_636),
    ("chr9", "9", "NC_000009.12", 138_394_717),
    ("chr10", "10", "NC_000010.11", 133_797_422),
    ("chr11", "11", "NC_000011.10", 135_086_622),
    ("chr12", "12", "NC_000012.12", 133_275_309),
    ("chr13", "13", "NC_000013.11", 114_364_328),
    ("chr14", "14", "NC_000014.9", 107_043_718),
    ("chr15", "15", "NC_000015.10", 101_991_189),
    ("chr16", "16", "NC_000016.10", 90_338_345),
    ("chr17", "17", "NC_000017.11", 83_257_441),
    ("chr18", "18", "NC_000018.10", 80_373_285),
    ("chr19", "19", "NC_000019.10", 58_617_616),
    ("chr20", "20", "NC_000020.11", 64_444_167),
    ("chr21", "21", "NC_000021.9", 46_709_983),
    ("chr22", "22", "NC_000022.11", 50_818_468),
    ("chrX", "X", "NC_000023.11", 156_040_895),
    ("chrY", "Y", "NC_000024.10", 57_227_415),
    ("chrM", "MT", "NC_012920.1", 16_569),
];

/// An immutable table of chromosomes, built once and passed to whoever needs it
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    chromosomes: Vec<Chromosome>,
    by_name: HashMap<String, usize>,
}
impl ReferenceTable {
    /// Builds a table from chromosomes listed in ordinal order
    #[must_use]
    pub fn new(chromosomes: Vec<Chromosome>) -> Self {
        let mut by_name = HashMap::with_capacity(chromosomes.len() * 3);
        for (i, chrom) in chromosomes.iter().enumerate() {
            by_name.insert(chrom.ucsc_name.clone(), i);
            by_name.insert(chrom.ensembl_name.clone(), i);
            by_name.insert(chrom.accession.clone(), i);
        }
        Self {
            chromosomes,
            by_name,
        }
    }

    /// The 25 GRCh38 primary-assembly sequences (chr1-chr22, chrX, chrY, chrM)
    #[must_use]
    pub fn grch38() -> Self {
        Self::new(
            GRCH38
                .iter()
                .enumerate()
                .map(|(i, (ucsc, ensembl, accession, length))| {
                    Chromosome::new(ucsc, ensembl, accession, *length, i as u16)
                })
                .collect(),
        )
    }

    /// Looks up a chromosome by UCSC name, Ensembl name or accession
    pub fn get(&self, name: &str) -> Result<&Chromosome> {
        self.by_name
            .get(name)
            .map(|&i| &self.chromosomes[i])
            .ok_or_else(|| NotFoundError::UnknownChromosome(name.to_string()).into())
    }

    /// Looks up a chromosome by its ordinal index
    #[must_use]
    pub fn by_index(&self, index: u16) -> Option<&Chromosome> {
        self.chromosomes.iter().find(|c| c.index == index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chromosome> {
        self.chromosomes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chromosomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chromosomes.is_empty()
    }
}
