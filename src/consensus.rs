use crate::calls::{DepthCheck, ReadCall, StrandCounts, decode_record};
use crate::deletion::DeletionWindowResolver;
use crate::errors::Result;
use crate::pileup::{PileupReader, PileupRecord};
use crate::position::ConsensusPosition;
use crate::sequence::ConsensusSequence;
use std::io::BufRead;
use tracing::debug;

pub const DEFAULT_AMBIGUITY_THRESHOLD: f64 = 1.0 / 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusParams {
    /// Minimum per-symbol frequency for a call to survive voting.
    pub ambiguity_threshold: f64,
    pub min_coverage: u32,
    /// Inclusive upper bound on a selected sequence's complexity.
    pub max_complexity: usize,
    pub depth_check: DepthCheck,
    /// Separator between the gene-group prefix and the rest of a contig id.
    pub group_separator: char,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            ambiguity_threshold: DEFAULT_AMBIGUITY_THRESHOLD,
            min_coverage: 1,
            max_complexity: usize::MAX,
            depth_check: DepthCheck::Lenient,
            group_separator: '|',
        }
    }
}

/// Streams pileup rows into one [`ConsensusSequence`] per contig run.
///
/// Yields a sequence whenever the contig id changes or the position goes
/// backwards, and once more at end of input. The first error ends the
/// iteration.
pub struct ConsensusBuilder<R> {
    reader: PileupReader<R>,
    params: ConsensusParams,
    resolver: DeletionWindowResolver,
    current: Option<ConsensusSequence>,
    finished: bool,
}

pub fn build_consensus<R: BufRead>(
    reader: PileupReader<R>,
    params: ConsensusParams,
) -> ConsensusBuilder<R> {
    ConsensusBuilder::new(reader, params)
}

impl<R: BufRead> ConsensusBuilder<R> {
    pub fn new(reader: PileupReader<R>, params: ConsensusParams) -> Self {
        let resolver = DeletionWindowResolver::new(params.ambiguity_threshold, params.depth_check);
        Self {
            reader,
            params,
            resolver,
            current: None,
            finished: false,
        }
    }

    pub fn lines_read(&self) -> u64 {
        self.reader.lines_read()
    }

    fn starts_new_run(&self, record: &PileupRecord) -> bool {
        self.current.as_ref().is_some_and(|sequence| {
            sequence.contig() != record.contig || record.position < sequence.stop()
        })
    }

    fn consume(&mut self, record: PileupRecord) -> Result<()> {
        let coordinate = record.position;
        let threshold = self.params.ambiguity_threshold;
        let sequence = self
            .current
            .get_or_insert_with(|| ConsensusSequence::new(record.contig.clone()));

        if record.depth == 0 {
            return sequence.push(ConsensusPosition::gap(coordinate, record.reference));
        }

        let Some(calls) = decode_record(&record, self.params.depth_check)? else {
            return sequence.push(ConsensusPosition::gap(coordinate, record.reference));
        };

        if calls.iter().any(|call| call.deletion_length() > 0) {
            let outcome = self.resolver.resolve(&record, &calls, &mut self.reader)?;
            for mut position in outcome.positions {
                position.flatten(threshold);
                sequence.push(position)?;
            }
            return Ok(());
        }

        let observations: Vec<String> = calls.iter().map(ReadCall::symbol).collect();
        let support = observations.len() as u32;
        let mut position =
            ConsensusPosition::observed(coordinate, record.reference, observations, support);
        if position.flatten(threshold) {
            let strands = StrandCounts::from_calls(&calls);
            let forward_fractions: Vec<(char, f64)> = ['A', 'C', 'G', 'T']
                .into_iter()
                .filter_map(|base| strands.forward_fraction(base).map(|fraction| (base, fraction)))
                .collect();
            debug!(
                contig = %record.contig,
                position = coordinate,
                reference = %position.reference(),
                alleles = ?position.alleles(),
                forward_fractions = ?forward_fractions,
                gaps = strands.gaps,
                "ambiguous position"
            );
        }
        sequence.push(position)
    }
}

impl<R: BufRead> Iterator for ConsensusBuilder<R> {
    type Item = Result<ConsensusSequence>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let record = match self.reader.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => {
                    self.finished = true;
                    return self.current.take().map(Ok);
                }
                Err(error) => {
                    self.finished = true;
                    return Some(Err(error));
                }
            };

            if self.starts_new_run(&record) {
                self.reader.push_back(record);
                if let Some(done) = self.current.take() {
                    debug!(
                        contig = %done.contig(),
                        start = done.start(),
                        stop = done.stop(),
                        coverage = done.coverage(),
                        complexity = done.complexity(),
                        "consensus sequence complete"
                    );
                    return Some(Ok(done));
                }
                continue;
            }

            if let Err(error) = self.consume(record) {
                self.finished = true;
                return Some(Err(error));
            }
        }
    }
}
