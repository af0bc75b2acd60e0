use crate::calls::DepthCheck;
use crate::consensus::{ConsensusParams, DEFAULT_AMBIGUITY_THRESHOLD};
use crate::errors::{AppError, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};

#[derive(Debug, Clone, Parser)]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct CliArgs {
    #[arg(short = 'p', long = "pileup", num_args = 1..)]
    pileup: Vec<String>,
    #[arg(short = 'o', long = "output", default_value = "-")]
    out: String,
    #[arg(short = 'a', long = "ambiguity")]
    ambiguity: Option<String>,
    #[arg(short = 'c', long = "min-coverage", default_value = "1")]
    min_coverage: String,
    #[arg(short = 'x', long = "max-complexity")]
    max_complexity: Option<String>,
    #[arg(long = "strict", action = ArgAction::SetTrue)]
    strict: bool,
    #[arg(long = "group-separator", default_value = "|")]
    group_separator: String,
    #[arg(short = 'f', long = "format", default_value = "fasta")]
    format: String,
    #[arg(long = "parallel")]
    nproc: Option<String>,
    #[arg(long = "progress", action = ArgAction::SetTrue)]
    progress: bool,
    #[arg(long = "keep-gaps", action = ArgAction::SetTrue)]
    keep_gaps: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Fasta,
    Tsv,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "fasta" => Ok(Self::Fasta),
            "tsv" => Ok(Self::Tsv),
            other => Err(AppError::InvalidValue {
                flag: "--format".to_string(),
                value: other.to_string(),
                reason: "supported formats are \"fasta\" (default) and \"tsv\"".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusArgs {
    pub inputs: Vec<String>,
    pub out: String,
    pub ambiguity: f64,
    pub min_coverage: u32,
    pub max_complexity: Option<usize>,
    pub strict: bool,
    pub group_separator: char,
    pub format: OutputFormat,
    pub nproc: usize,
    pub progress: bool,
    pub keep_gaps: bool,
}

impl Default for ConsensusArgs {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            out: "-".to_string(),
            ambiguity: DEFAULT_AMBIGUITY_THRESHOLD,
            min_coverage: 1,
            max_complexity: None,
            strict: false,
            group_separator: '|',
            format: OutputFormat::Fasta,
            nproc: 1,
            progress: false,
            keep_gaps: false,
        }
    }
}

impl ConsensusArgs {
    pub fn params(&self) -> ConsensusParams {
        ConsensusParams {
            ambiguity_threshold: self.ambiguity,
            min_coverage: self.min_coverage,
            max_complexity: self.max_complexity.unwrap_or(usize::MAX),
            depth_check: if self.strict {
                DepthCheck::Strict
            } else {
                DepthCheck::Lenient
            },
            group_separator: self.group_separator,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(AppError::MissingRequired {
                field: "--pileup".to_string(),
            });
        }
        if !(self.ambiguity > 0.0 && self.ambiguity <= 1.0) {
            return Err(AppError::InvalidValue {
                flag: "--ambiguity".to_string(),
                value: self.ambiguity.to_string(),
                reason: "must be greater than 0 and at most 1".to_string(),
            });
        }
        if self.nproc == 0 {
            return Err(AppError::InvalidValue {
                flag: "--parallel".to_string(),
                value: "0".to_string(),
                reason: "must be a positive integer".to_string(),
            });
        }
        Ok(())
    }
}

pub fn parse_from_env() -> Result<ConsensusArgs> {
    parse_args(std::env::args())
}

pub fn parse_args<I, S>(args: I) -> Result<ConsensusArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut tokens: Vec<String> = args.into_iter().map(Into::into).collect();
    if tokens.is_empty() {
        tokens.push("pileup2consensus".to_string());
    }

    let cli = CliArgs::try_parse_from(tokens).map_err(map_clap_error)?;

    let parsed = ConsensusArgs {
        inputs: cli.pileup,
        out: cli.out,
        ambiguity: cli
            .ambiguity
            .as_deref()
            .map_or(Ok(DEFAULT_AMBIGUITY_THRESHOLD), |value| {
                parse_f64("--ambiguity", value)
            })?,
        min_coverage: parse_u32("--min-coverage", &cli.min_coverage)?,
        max_complexity: cli
            .max_complexity
            .as_deref()
            .map(|value| parse_usize("--max-complexity", value))
            .transpose()?,
        strict: cli.strict,
        group_separator: parse_separator(&cli.group_separator)?,
        format: OutputFormat::parse(&cli.format)?,
        nproc: cli
            .nproc
            .as_deref()
            .map_or(Ok(1), |value| parse_usize("--parallel", value))?,
        progress: cli.progress,
        keep_gaps: cli.keep_gaps,
    };

    parsed.validate()?;
    Ok(parsed)
}

fn map_clap_error(error: clap::Error) -> AppError {
    let kind = error.kind();
    let rendered = error.to_string();
    match kind {
        ErrorKind::UnknownArgument => AppError::UnsupportedArgument {
            arg: first_quoted_token(&rendered).unwrap_or(rendered),
        },
        ErrorKind::TooFewValues | ErrorKind::WrongNumberOfValues => AppError::MissingValue {
            flag: first_quoted_token(&rendered).unwrap_or_else(|| "argument".to_string()),
        },
        _ => AppError::ParseError {
            message: clap_error_message(&rendered),
        },
    }
}

fn first_quoted_token(message: &str) -> Option<String> {
    let start = message.find('\'')?;
    let end = message[start + 1..].find('\'')?;
    Some(message[start + 1..start + 1 + end].to_string())
}

fn clap_error_message(message: &str) -> String {
    message
        .lines()
        .find_map(|line| line.strip_prefix("error: "))
        .or_else(|| message.lines().next())
        .unwrap_or("failed to parse arguments")
        .to_string()
}

fn parse_separator(value: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(separator), None) => Ok(separator),
        _ => Err(AppError::InvalidValue {
            flag: "--group-separator".to_string(),
            value: value.to_string(),
            reason: "must be a single character".to_string(),
        }),
    }
}

fn parse_usize(flag: &str, value: &str) -> Result<usize> {
    value.parse::<usize>().map_err(|_| AppError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
        reason: "must be a non-negative integer".to_string(),
    })
}

fn parse_u32(flag: &str, value: &str) -> Result<u32> {
    value.parse::<u32>().map_err(|_| AppError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
        reason: "must be a non-negative integer".to_string(),
    })
}

fn parse_f64(flag: &str, value: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|_| AppError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
        reason: "must be a floating-point number".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{OutputFormat, parse_args};
    use crate::calls::DepthCheck;
    use crate::errors::AppError;

    #[test]
    fn parses_minimal_arguments_with_defaults() {
        let args = parse_args(["pileup2consensus", "-p", "sample.pileup.gz"])
            .expect("expected parse success");

        assert_eq!(args.inputs, vec!["sample.pileup.gz"]);
        assert_eq!(args.out, "-");
        assert_eq!(args.format, OutputFormat::Fasta);
        assert_eq!(args.nproc, 1);
        assert!(!args.keep_gaps);

        let params = args.params();
        assert!((params.ambiguity_threshold - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(params.min_coverage, 1);
        assert_eq!(params.max_complexity, usize::MAX);
        assert_eq!(params.depth_check, DepthCheck::Lenient);
        assert_eq!(params.group_separator, '|');
    }

    #[test]
    fn parses_every_option() {
        let args = parse_args([
            "pileup2consensus",
            "--pileup",
            "a.pileup",
            "b.pileup.gz",
            "-o",
            "out.tsv.gz",
            "-a",
            "0.25",
            "-c",
            "10",
            "-x",
            "3",
            "--strict",
            "--group-separator",
            "_",
            "-f",
            "tsv",
            "--parallel",
            "4",
            "--progress",
            "--keep-gaps",
        ])
        .expect("expected parse success");

        assert_eq!(args.inputs, vec!["a.pileup", "b.pileup.gz"]);
        assert_eq!(args.format, OutputFormat::Tsv);
        assert_eq!(args.nproc, 4);
        assert!(args.progress);
        assert!(args.keep_gaps);

        let params = args.params();
        assert_eq!(params.ambiguity_threshold, 0.25);
        assert_eq!(params.min_coverage, 10);
        assert_eq!(params.max_complexity, 3);
        assert_eq!(params.depth_check, DepthCheck::Strict);
        assert_eq!(params.group_separator, '_');
    }

    #[test]
    fn rejects_missing_pileup() {
        let error = parse_args(["pileup2consensus", "-o", "out.fa"]).expect_err("expected failure");
        assert!(matches!(error, AppError::MissingRequired { .. }));
    }

    #[test]
    fn rejects_out_of_range_ambiguity() {
        assert!(parse_args(["pileup2consensus", "-p", "a", "-a", "0"]).is_err());
        assert!(parse_args(["pileup2consensus", "-p", "a", "-a", "1.5"]).is_err());
        assert!(parse_args(["pileup2consensus", "-p", "a", "-a", "third"]).is_err());
    }

    #[test]
    fn rejects_unknown_format_and_wide_separator() {
        let error = parse_args(["pileup2consensus", "-p", "a", "-f", "genbank"])
            .expect_err("expected failure");
        assert!(matches!(error, AppError::InvalidValue { .. }));
        assert!(parse_args(["pileup2consensus", "-p", "a", "--group-separator", "||"]).is_err());
    }

    #[test]
    fn rejects_zero_parallelism() {
        assert!(parse_args(["pileup2consensus", "-p", "a", "--parallel", "0"]).is_err());
    }

    #[test]
    fn reports_unknown_arguments() {
        let error = parse_args(["pileup2consensus", "-p", "a", "--gc", "x"])
            .expect_err("expected failure");
        assert!(matches!(error, AppError::UnsupportedArgument { .. }));
    }
}
