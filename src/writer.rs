use std::fs::{self, File};
use std::io::{BufWriter, Write, stdout};
use std::path::Path;

use crate::cli::OutputFormat;
use crate::errors::Result;
use crate::sequence::ConsensusSequence;
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::{Builder, NamedTempFile};

pub const TSV_HEADER: [&str; 7] = [
    "source",
    "contig",
    "start",
    "stop",
    "coverage",
    "complexity",
    "sequence",
];

/// Selected sequences of one pileup input.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleConsensus {
    pub source: String,
    pub sequences: Vec<ConsensusSequence>,
}

pub fn write_tsv_header<W: Write + ?Sized>(writer: &mut W) -> Result<()> {
    writer.write_all(TSV_HEADER.join("\t").as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

pub fn write_fasta_record<W: Write + ?Sized>(
    writer: &mut W,
    source: &str,
    sequence: &ConsensusSequence,
    keep_gaps: bool,
) -> Result<()> {
    writeln!(
        writer,
        ">{} {}-{} coverage={:.2} complexity={} source={}",
        sequence.contig(),
        sequence.start(),
        sequence.stop(),
        sequence.coverage(),
        sequence.complexity(),
        source
    )?;
    writer.write_all(sequence.to_sequence_string(keep_gaps).as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

pub fn write_tsv_record<W: Write + ?Sized>(
    writer: &mut W,
    source: &str,
    sequence: &ConsensusSequence,
    keep_gaps: bool,
) -> Result<()> {
    writeln!(
        writer,
        "{}\t{}\t{}\t{}\t{:.2}\t{}\t{}",
        source,
        sequence.contig(),
        sequence.start(),
        sequence.stop(),
        sequence.coverage(),
        sequence.complexity(),
        sequence.to_sequence_string(keep_gaps)
    )?;
    Ok(())
}

pub fn write_samples<W: Write + ?Sized>(
    writer: &mut W,
    format: OutputFormat,
    samples: &[SampleConsensus],
    keep_gaps: bool,
) -> Result<()> {
    if format == OutputFormat::Tsv {
        write_tsv_header(writer)?;
    }
    for sample in samples {
        for sequence in &sample.sequences {
            match format {
                OutputFormat::Fasta => {
                    write_fasta_record(writer, &sample.source, sequence, keep_gaps)?
                }
                OutputFormat::Tsv => write_tsv_record(writer, &sample.source, sequence, keep_gaps)?,
            }
        }
    }
    Ok(())
}

/// Runs `write_fn` against the output named by `path`: `-` is stdout, a
/// `.gz` suffix gzip-compresses through a temporary file that replaces
/// `path` once complete, anything else is a plain file.
pub fn with_text_output_writer<F>(path: &str, write_fn: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    if path == "-" {
        let mut out = stdout().lock();
        write_fn(&mut out)?;
        out.flush()?;
        return Ok(());
    }

    if path.ends_with(".gz") {
        let output_path = Path::new(path);
        let parent_dir = match output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut gz_file = Builder::new()
            .prefix("pileup2consensus_")
            .suffix(".tmp.gz")
            .tempfile_in(parent_dir)?;

        {
            let mut encoder = GzEncoder::new(
                BufWriter::new(gz_file.as_file_mut()),
                Compression::default(),
            );
            write_fn(&mut encoder)?;
            encoder.finish()?.flush()?;
        }

        return persist_tempfile_to_path(gz_file, path);
    }

    let mut file = BufWriter::new(File::create(path)?);
    write_fn(&mut file)?;
    file.flush()?;
    Ok(())
}

fn persist_tempfile_to_path(tempfile: NamedTempFile, output: &str) -> Result<()> {
    match tempfile.persist(output) {
        Ok(_) => Ok(()),
        Err(error) => {
            let file = error.file;
            let mut input = File::open(file.path())?;
            let mut out = BufWriter::new(File::create(output)?);
            std::io::copy(&mut input, &mut out)?;
            out.flush()?;
            fs::remove_file(file.path())?;
            Ok(())
        }
    }
}
