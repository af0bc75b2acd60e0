use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing value for argument: {flag}")]
    MissingValue { flag: String },
    #[error("missing required argument: {field}")]
    MissingRequired { field: String },
    #[error("invalid value for {flag}={value}: {reason}")]
    InvalidValue {
        flag: String,
        value: String,
        reason: String,
    },
    #[error("unsupported argument: {arg}")]
    UnsupportedArgument { arg: String },
    #[error("parse error: {message}")]
    ParseError { message: String },
    #[error("malformed pileup row at line {line}: {reason}")]
    MalformedPileupRow { line: u64, reason: String },
    #[error("unrecognized marker {marker:?} at offset {offset} of calls {calls:?} (line {line})")]
    UnrecognizedMarker {
        line: u64,
        marker: char,
        offset: usize,
        calls: String,
    },
    #[error("non-contiguous append to {contig}: expected position {expected}, got {found}")]
    NonContiguousAppend {
        contig: String,
        expected: u64,
        found: u64,
    },
    #[error(
        "deletion window at {contig}:{position} did not settle after buffering {rows} rows (limit {limit})"
    )]
    WindowOverflow {
        contig: String,
        position: u64,
        rows: usize,
        limit: usize,
    },
    #[error("fragment {start}-{stop} is outside consensus range {seq_start}-{seq_stop}")]
    FragmentOutOfRange {
        start: u64,
        stop: u64,
        seq_start: u64,
        seq_stop: u64,
    },
    #[error("cannot merge consensus sequences: {reason}")]
    MergeConflict { reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub(crate) fn malformed(line: u64, reason: impl Into<String>) -> Self {
        Self::MalformedPileupRow {
            line,
            reason: reason.into(),
        }
    }
}
