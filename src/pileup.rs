use crate::errors::{AppError, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use tracing::info;

const PILEUP_FIELDS: usize = 7;
const REQUIRED_FIELDS: usize = 4;

/// One row of samtools `mpileup` text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PileupRecord {
    pub line: u64,
    pub contig: String,
    pub position: u64,
    pub reference: char,
    pub depth: u32,
    pub calls: String,
    pub base_qualities: Vec<u8>,
    pub mapping_qualities: Vec<u8>,
}

/// Parses one tab-separated pileup row, right-padding short rows to seven
/// columns.
pub fn parse_pileup_line(line: &[u8], line_number: u64) -> Result<PileupRecord> {
    let line = trim_line_end(line);
    let mut fields: Vec<&[u8]> = line.splitn(PILEUP_FIELDS, |byte| *byte == b'\t').collect();
    while fields.len() < PILEUP_FIELDS {
        fields.push(b"");
    }

    let populated = fields[..REQUIRED_FIELDS]
        .iter()
        .filter(|field| !field.is_empty())
        .count();
    if populated < REQUIRED_FIELDS {
        return Err(AppError::malformed(
            line_number,
            format!(
                "expected at least {REQUIRED_FIELDS} populated fields, found {populated}: {}",
                String::from_utf8_lossy(line)
            ),
        ));
    }

    let position = parse_u64_ascii(fields[1])
        .filter(|position| *position > 0)
        .ok_or_else(|| {
            AppError::malformed(
                line_number,
                format!("invalid position: {}", String::from_utf8_lossy(fields[1])),
            )
        })?;
    let depth = parse_u32_ascii(fields[3]).ok_or_else(|| {
        AppError::malformed(
            line_number,
            format!("invalid depth: {}", String::from_utf8_lossy(fields[3])),
        )
    })?;
    let reference = fields[2]
        .first()
        .map(|base| base.to_ascii_uppercase() as char)
        .ok_or_else(|| AppError::malformed(line_number, "missing reference call"))?;

    Ok(PileupRecord {
        line: line_number,
        contig: decode_field(fields[0]),
        position,
        reference,
        depth,
        calls: decode_field(fields[4]),
        base_qualities: fields[5].to_vec(),
        mapping_qualities: fields[6].to_vec(),
    })
}

/// Forward-only stream of pileup records with a single slot of push-back,
/// which the deletion window uses to hand back a row that belongs to the
/// next contig.
pub struct PileupReader<R> {
    reader: R,
    line_buffer: Vec<u8>,
    line_number: u64,
    pending: Option<PileupRecord>,
}

impl<R: BufRead> PileupReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buffer: Vec::with_capacity(256),
            line_number: 0,
            pending: None,
        }
    }

    pub fn next_record(&mut self) -> Result<Option<PileupRecord>> {
        if let Some(record) = self.pending.take() {
            return Ok(Some(record));
        }
        loop {
            self.line_buffer.clear();
            let read = self.reader.read_until(b'\n', &mut self.line_buffer)?;
            if read == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = trim_line_end(&self.line_buffer);
            if line.is_empty() || line.iter().all(|byte| byte.is_ascii_whitespace()) {
                continue;
            }
            return parse_pileup_line(line, self.line_number).map(Some);
        }
    }

    /// Returns a record to the front of the stream. Only one record can be
    /// held back at a time.
    pub fn push_back(&mut self, record: PileupRecord) {
        debug_assert!(self.pending.is_none(), "push-back slot already occupied");
        self.pending = Some(record);
    }

    pub fn lines_read(&self) -> u64 {
        self.line_number
    }
}

impl<R: BufRead> Iterator for PileupReader<R> {
    type Item = Result<PileupRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Opens a plain or gzip/bgzip-compressed pileup file.
pub fn open_pileup(path: &str) -> Result<PileupReader<Box<dyn BufRead + Send>>> {
    info!(input = %path, compressed = path.ends_with(".gz"), "opening pileup input");
    let file = File::open(path)?;
    let reader: Box<dyn BufRead + Send> = if path.ends_with(".gz") {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(PileupReader::new(reader))
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 {
        let value = line[end - 1];
        if value == b'\n' || value == b'\r' {
            end -= 1;
        } else {
            break;
        }
    }
    &line[..end]
}

fn decode_field(field: &[u8]) -> String {
    match std::str::from_utf8(field) {
        Ok(text) => text.to_owned(),
        Err(_) => String::from_utf8_lossy(field).into_owned(),
    }
}

fn parse_u64_ascii(raw: &[u8]) -> Option<u64> {
    if raw.is_empty() {
        return None;
    }

    let mut value: u64 = 0;
    for &byte in raw {
        if !byte.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add(u64::from(byte - b'0'))?;
    }
    Some(value)
}

fn parse_u32_ascii(raw: &[u8]) -> Option<u32> {
    parse_u64_ascii(raw).and_then(|value| u32::try_from(value).ok())
}
