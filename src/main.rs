//! nsadump: print the contents of an NSA annotation store
//!
//! Usage:
//!   nsadump --nsa clinvar.nsa [--chrom chr1] [--start 1000] [--end 2000]
//!   nsadump --nsa clinvar.nsa --blocks
//!
//! Records are printed as `chrom  pos  ref  alt  annotation`, tab separated.
//! Block mode prints one line per stored block instead.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use nsastore::{BlockRange, Chromosome, FileReader, ReaderBuilder, ReferenceTable, index_path};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "nsadump", version, about = "Dump the contents of an NSA annotation store")]
struct Cli {
    /// Path to the data file; its index is expected at `<path>.idx`
    #[arg(long)]
    nsa: PathBuf,

    /// Restrict output to one chromosome (UCSC or Ensembl name)
    #[arg(long)]
    chrom: Option<String>,

    /// First position to print
    #[arg(long, default_value_t = 1)]
    start: i32,

    /// Last position to print
    #[arg(long, default_value_t = i32::MAX)]
    end: i32,

    /// Advisory byte budget for each preload window
    #[arg(long, env = "NSA_WINDOW_BYTES", default_value_t = nsastore::DEFAULT_WINDOW_BYTES)]
    window: usize,

    /// Print block headers instead of records
    #[arg(long)]
    blocks: bool,

    /// Skip corrupt blocks instead of stopping at the first one
    #[arg(long)]
    best_effort: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "NSA_LOG", default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let table = ReferenceTable::grch38();
    let chromosomes = select_chromosomes(&table, cli.chrom.as_deref())?;
    let mut reader = open_reader(&cli)?;
    info!(
        path = %cli.nsa.display(),
        assembly = %reader.metadata().assembly,
        source = %reader.metadata().version.name,
        "opened store"
    );

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    for chromosome in chromosomes {
        if !reader.has_chromosome(chromosome) {
            debug!(chromosome = %chromosome.ucsc_name, "no blocks stored");
            continue;
        }
        if cli.blocks {
            dump_blocks(&mut reader, chromosome, &mut out)?;
        } else {
            dump_records(&mut reader, chromosome, cli.start, cli.end, cli.window, &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the dump itself
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn open_reader(cli: &Cli) -> Result<FileReader> {
    check_exists(&cli.nsa, "data file")?;
    check_exists(&index_path(&cli.nsa), "index file")?;
    ReaderBuilder::default()
        .window_bytes(cli.window)
        .best_effort(cli.best_effort)
        .open(&cli.nsa)
        .with_context(|| format!("opening store {}", cli.nsa.display()))
}

fn check_exists(path: &Path, what: &str) -> Result<()> {
    if !path.is_file() {
        bail!("{what} not found: {}", path.display());
    }
    Ok(())
}

fn select_chromosomes<'a>(
    table: &'a ReferenceTable,
    name: Option<&str>,
) -> Result<Vec<&'a Chromosome>> {
    match name {
        Some(name) => {
            let chromosome = table
                .get(name)
                .with_context(|| format!("resolving chromosome {name}"))?;
            Ok(vec![chromosome])
        }
        None => Ok(table.iter().collect()),
    }
}

/// Expansion assumed for the first group, as decompressed bytes per stored byte
const INITIAL_EXPANSION: (u64, u64) = (4, 1);

/// Number of leading blocks whose estimated decompressed size fits the window budget
///
/// The estimate scales each block's stored length by `expansion`. A block that alone
/// exceeds the budget still forms a group of one.
fn next_group(ranges: &[BlockRange], budget: usize, expansion: (u64, u64)) -> usize {
    let (num, den) = (expansion.0, expansion.1.max(1));
    let mut size = 0u64;
    for (i, range) in ranges.iter().enumerate() {
        size = size.saturating_add(u64::from(range.length()).saturating_mul(num) / den);
        if i > 0 && size > budget as u64 {
            return i;
        }
    }
    ranges.len()
}

fn dump_records<W: Write>(
    reader: &mut FileReader,
    chromosome: &Chromosome,
    start: i32,
    end: i32,
    window: usize,
    out: &mut W,
) -> Result<()> {
    let ranges = reader
        .blocks_for(chromosome, start, end)
        .with_context(|| format!("locating blocks on {}", chromosome.ucsc_name))?;

    let mut expansion = INITIAL_EXPANSION;
    let mut rest = ranges.as_slice();
    while !rest.is_empty() {
        let (group, tail) = rest.split_at(next_group(rest, window, expansion));
        rest = tail;
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let lo = start.max(first.first_position());
        let hi = end.min(last.last_position());
        reader
            .preload(chromosome, lo..=hi)
            .with_context(|| format!("loading {}:{lo}-{hi}", chromosome.ucsc_name))?;

        // later groups are sized by what this store actually decompresses to
        let stored: u64 = group.iter().map(|r| u64::from(r.length())).sum();
        let decompressed = reader.window().decompressed_bytes() as u64;
        if stored > 0 && decompressed > 0 {
            expansion = (decompressed, stored);
        }

        for (position, records) in reader.window().iter() {
            if position < lo || position > hi {
                continue;
            }
            for record in records {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}\t{}",
                    chromosome.ucsc_name,
                    position,
                    record.ref_allele,
                    record.alt_allele,
                    record.annotation
                )?;
            }
        }
    }
    Ok(())
}

fn dump_blocks<W: Write>(
    reader: &mut FileReader,
    chromosome: &Chromosome,
    out: &mut W,
) -> Result<()> {
    let blocks = reader
        .compressed_blocks(chromosome)
        .with_context(|| format!("reading blocks of {}", chromosome.ucsc_name))?;
    for block in blocks {
        let decoded = reader.decode_block(&block).with_context(|| {
            format!(
                "decoding block at offset {} on {}",
                block.offset, chromosome.ucsc_name
            )
        })?;
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            chromosome.ucsc_name,
            block.offset,
            block.block_len(),
            block.header.compressed_len,
            block.header.first_position,
            block.header.num_records,
            decoded.len()
        )?;
    }
    Ok(())
}
