use crate::errors::{AppError, Result};
use crate::pileup::PileupRecord;
use tracing::warn;

pub const GAP: char = '-';
pub const GAP_STR: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadCall {
    /// A base (case encodes strand), the gap symbol, or a base followed by
    /// uppercased inserted bases.
    Plain(String),
    Deletion(String, usize),
}

impl ReadCall {
    pub fn text(&self) -> &str {
        match self {
            Self::Plain(text) | Self::Deletion(text, _) => text,
        }
    }

    pub fn symbol(&self) -> String {
        self.text().to_ascii_uppercase()
    }

    pub fn deletion_length(&self) -> usize {
        match self {
            Self::Plain(_) => 0,
            Self::Deletion(_, length) => *length,
        }
    }

    pub fn is_gap(&self) -> bool {
        self.text() == GAP_STR
    }

    pub fn is_reverse(&self) -> bool {
        self.text()
            .chars()
            .next()
            .is_some_and(|base| base.is_ascii_lowercase())
    }

    fn text_mut(&mut self) -> &mut String {
        match self {
            Self::Plain(text) | Self::Deletion(text, _) => text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthCheck {
    #[default]
    Lenient,
    Strict,
}

/// Markers are dispatched by the byte found at the current offset, so an
/// insertion or deletion always binds to the token emitted just before it.
pub fn decode_calls(calls: &str, reference: char, line: u64) -> Result<Vec<ReadCall>> {
    let bytes = calls.as_bytes();
    let forward = reference.to_ascii_uppercase();
    let reverse = reference.to_ascii_lowercase();
    let mut tokens: Vec<ReadCall> = Vec::with_capacity(bytes.len());
    let mut n = 0usize;

    while n < bytes.len() {
        match bytes[n] {
            b'^' => {
                if n + 1 >= bytes.len() {
                    return Err(AppError::malformed(
                        line,
                        "read-start marker without mapping quality",
                    ));
                }
                n += 2;
            }
            b'$' => n += 1,
            b'.' => {
                tokens.push(ReadCall::Plain(forward.to_string()));
                n += 1;
            }
            b',' => {
                tokens.push(ReadCall::Plain(reverse.to_string()));
                n += 1;
            }
            base @ (b'A' | b'C' | b'G' | b'T' | b'N' | b'a' | b'c' | b'g' | b't' | b'n') => {
                tokens.push(ReadCall::Plain((base as char).to_string()));
                n += 1;
            }
            b'*' | b'#' | b'<' | b'>' => {
                tokens.push(ReadCall::Plain(GAP_STR.to_string()));
                n += 1;
            }
            marker @ (b'+' | b'-') => {
                let (length, sequence, next) = read_indel(bytes, n, line)?;
                let previous = tokens.last_mut().ok_or_else(|| {
                    AppError::malformed(
                        line,
                        format!("{} marker at offset {n} has no preceding read", marker as char),
                    )
                })?;
                if marker == b'+' {
                    previous
                        .text_mut()
                        .push_str(&sequence.to_ascii_uppercase());
                } else {
                    let text = std::mem::take(previous.text_mut());
                    *previous = ReadCall::Deletion(text, length);
                }
                n = next;
            }
            other => {
                return Err(AppError::UnrecognizedMarker {
                    line,
                    marker: other as char,
                    offset: n,
                    calls: calls.to_string(),
                });
            }
        }
    }

    Ok(tokens)
}

/// Returns `Ok(None)` when the row is discarded in lenient mode.
pub fn decode_record(record: &PileupRecord, check: DepthCheck) -> Result<Option<Vec<ReadCall>>> {
    let tokens = decode_calls(&record.calls, record.reference, record.line)?;
    if tokens.len() == record.depth as usize {
        return Ok(Some(tokens));
    }

    match check {
        DepthCheck::Strict => Err(AppError::malformed(
            record.line,
            format!(
                "decoded {} reads but depth is {} at {}:{}",
                tokens.len(),
                record.depth,
                record.contig,
                record.position
            ),
        )),
        DepthCheck::Lenient => {
            warn!(
                line = record.line,
                contig = %record.contig,
                position = record.position,
                decoded = tokens.len(),
                depth = record.depth,
                "discarding pileup row whose read count does not match its depth"
            );
            Ok(None)
        }
    }
}

fn read_indel(bytes: &[u8], marker: usize, line: u64) -> Result<(usize, &str, usize)> {
    let mut offset = marker + 1;
    while offset < bytes.len() && bytes[offset].is_ascii_digit() {
        offset += 1;
    }
    if offset == marker + 1 {
        return Err(AppError::malformed(
            line,
            format!("indel marker at offset {marker} has no length"),
        ));
    }
    let length = std::str::from_utf8(&bytes[(marker + 1)..offset])
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .ok_or_else(|| {
            AppError::malformed(line, format!("indel length at offset {marker} overflows"))
        })?;
    let end = offset
        .checked_add(length)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| {
            AppError::malformed(
                line,
                format!("indel at offset {marker} claims {length} bases past the end of the calls"),
            )
        })?;
    let sequence = &bytes[offset..end];
    if !sequence
        .iter()
        .all(|base| base.is_ascii_alphabetic() || *base == b'*')
    {
        return Err(AppError::malformed(
            line,
            format!("indel at offset {marker} carries non-base characters"),
        ));
    }
    let sequence = std::str::from_utf8(sequence)
        .map_err(|_| AppError::malformed(line, "indel sequence is not ASCII"))?;
    Ok((length, sequence, end))
}

// Indexed A, C, G, T.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StrandCounts {
    pub forward: [u32; 4],
    pub reverse: [u32; 4],
    pub gaps: u32,
}

impl StrandCounts {
    pub fn from_calls(calls: &[ReadCall]) -> Self {
        let mut counts = Self::default();
        for call in calls {
            if call.is_gap() {
                counts.gaps += 1;
                continue;
            }
            let Some(index) = call
                .text()
                .chars()
                .next()
                .and_then(|first| base_to_index(first.to_ascii_uppercase()))
            else {
                continue;
            };
            if call.is_reverse() {
                counts.reverse[index] += 1;
            } else {
                counts.forward[index] += 1;
            }
        }
        counts
    }

    pub fn total(&self, base: char) -> u32 {
        base_to_index(base.to_ascii_uppercase())
            .map(|index| self.forward[index] + self.reverse[index])
            .unwrap_or(0)
    }

    pub fn forward_fraction(&self, base: char) -> Option<f64> {
        let index = base_to_index(base.to_ascii_uppercase())?;
        let total = self.total(base);
        (total > 0).then(|| f64::from(self.forward[index]) / f64::from(total))
    }
}

fn base_to_index(base: char) -> Option<usize> {
    match base {
        'A' => Some(0),
        'C' => Some(1),
        'G' => Some(2),
        'T' => Some(3),
        _ => None,
    }
}
