use crate::cli::ConsensusArgs;
use crate::consensus::{ConsensusParams, build_consensus};
use crate::errors::{AppError, Result};
use crate::pileup::open_pileup;
use crate::selector::select_sequences;
use crate::writer::{self, SampleConsensus};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

pub fn run(args: &ConsensusArgs) -> Result<()> {
    info!(
        inputs = args.inputs.len(),
        parallel = args.nproc,
        output = %args.out,
        format = ?args.format,
        "starting consensus run"
    );
    let started = Instant::now();
    let params = args.params();
    let progress = Mutex::new(PipelineProgress::new(
        args.progress,
        &args.out,
        &args.inputs,
    ));

    let samples = if args.nproc > 1 && args.inputs.len() > 1 {
        let pool = ThreadPoolBuilder::new()
            .num_threads(args.nproc)
            .build()
            .map_err(|err| AppError::ParseError {
                message: format!("failed to initialize rayon thread pool: {err}"),
            })?;
        pool.install(|| {
            args.inputs
                .par_iter()
                .map(|input| process_input(input, &params, &progress))
                .collect::<Result<Vec<_>>>()
        })?
    } else {
        args.inputs
            .iter()
            .map(|input| process_input(input, &params, &progress))
            .collect::<Result<Vec<_>>>()?
    };

    if let Ok(mut progress) = progress.lock() {
        progress.finish();
    }

    writer::with_text_output_writer(&args.out, |out| {
        writer::write_samples(out, args.format, &samples, args.keep_gaps)
    })?;

    info!(
        inputs = samples.len(),
        sequences = samples.iter().map(|sample| sample.sequences.len()).sum::<usize>(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        output = %args.out,
        "completed consensus run"
    );
    Ok(())
}

/// Builds and selects the consensus sequences of one pileup file.
pub fn process_input(
    input: &str,
    params: &ConsensusParams,
    progress: &Mutex<PipelineProgress>,
) -> Result<SampleConsensus> {
    let reader = open_pileup(input)?;
    let mut builder = build_consensus(reader, params.clone());
    let sequences = select_sequences(
        builder.by_ref().inspect(|sequence| {
            if let (Ok(sequence), Ok(mut progress)) = (sequence, progress.lock()) {
                progress.on_processed(sequence.contig(), sequence.stop());
            }
        }),
        params,
    )?;

    if let Ok(mut progress) = progress.lock() {
        progress.on_emitted(sequences.len() as u64);
    }
    info!(
        input = %input,
        lines = builder.lines_read(),
        selected = sequences.len(),
        "completed pileup input"
    );

    Ok(SampleConsensus {
        source: source_label(input),
        sequences,
    })
}

fn source_label(input: &str) -> String {
    Path::new(input)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.to_string())
}

#[derive(Debug)]
pub struct PipelineProgress {
    progress_bar: Option<ProgressBar>,
    processed_sequences: u64,
    emitted_sequences: u64,
    finished: bool,
}

impl PipelineProgress {
    const UPDATE_EVERY: u64 = 100;

    pub fn new(enabled: bool, output: &str, inputs: &[String]) -> Self {
        let progress_bar = if enabled {
            let bar = ProgressBar::new_spinner();
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(4));
            let style = ProgressStyle::with_template("{spinner:.green} {elapsed_precise} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(200));
            bar.set_message(format!("starting output={output} inputs={}", inputs.len()));
            Some(bar)
        } else {
            None
        };

        Self {
            progress_bar,
            processed_sequences: 0,
            emitted_sequences: 0,
            finished: false,
        }
    }

    fn on_processed(&mut self, contig: &str, stop: u64) {
        self.processed_sequences += 1;
        if self.processed_sequences == 1
            || self.processed_sequences.is_multiple_of(Self::UPDATE_EVERY)
        {
            self.set_message(contig, stop);
        }
    }

    fn on_emitted(&mut self, count: u64) {
        self.emitted_sequences += count;
    }

    fn finish(&mut self) {
        if let Some(bar) = &self.progress_bar {
            bar.finish_with_message(format!(
                "done built={} selected={}",
                self.processed_sequences, self.emitted_sequences
            ));
        }
        self.finished = true;
    }

    fn set_message(&self, contig: &str, stop: u64) {
        if let Some(bar) = &self.progress_bar {
            bar.set_message(format!(
                "built={} selected={} contig={contig}:{stop}",
                self.processed_sequences, self.emitted_sequences
            ));
        }
    }
}

impl Drop for PipelineProgress {
    fn drop(&mut self) {
        if !self.finished
            && let Some(bar) = &self.progress_bar
        {
            bar.finish_and_clear();
        }
    }
}
