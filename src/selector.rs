use crate::consensus::{ConsensusParams, build_consensus};
use crate::errors::Result;
use crate::pileup::PileupReader;
use crate::sequence::ConsensusSequence;
use std::collections::HashMap;
use std::io::BufRead;
use tracing::debug;

/// Gene-group key of a contig id: the prefix before the first separator,
/// trimmed of surrounding whitespace.
pub fn gene_group(contig: &str, separator: char) -> &str {
    contig
        .split(separator)
        .next()
        .unwrap_or(contig)
        .trim()
}

/// Keeps the best sequence of each gene group.
///
/// Sequences under `min_coverage` never compete. Within a group the lowest
/// complexity wins, ties going to the earlier sequence; the winner is then
/// dropped if its complexity exceeds `max_complexity`. Groups come out in
/// order of first appearance.
pub fn select_sequences<I>(sequences: I, params: &ConsensusParams) -> Result<Vec<ConsensusSequence>>
where
    I: IntoIterator<Item = Result<ConsensusSequence>>,
{
    let mut groups: Vec<ConsensusSequence> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for sequence in sequences {
        let sequence = sequence?;
        if sequence.coverage() < f64::from(params.min_coverage) {
            debug!(
                contig = %sequence.contig(),
                coverage = sequence.coverage(),
                min_coverage = params.min_coverage,
                "dropping low-coverage sequence"
            );
            continue;
        }

        let key = gene_group(sequence.contig(), params.group_separator).to_string();
        match index.get(&key) {
            Some(slot) => {
                let best = &mut groups[*slot];
                if sequence.complexity() < best.complexity() {
                    *best = sequence;
                }
            }
            None => {
                index.insert(key, groups.len());
                groups.push(sequence);
            }
        }
    }

    groups.retain(|sequence| {
        let keep = sequence.complexity() <= params.max_complexity;
        if !keep {
            debug!(
                contig = %sequence.contig(),
                complexity = sequence.complexity(),
                max_complexity = params.max_complexity,
                "dropping over-complex sequence"
            );
        }
        keep
    });
    Ok(groups)
}

/// Builds every consensus sequence of a pileup stream and selects one per
/// gene group.
pub fn build_sequences<R: BufRead>(
    reader: PileupReader<R>,
    params: &ConsensusParams,
) -> Result<Vec<ConsensusSequence>> {
    select_sequences(build_consensus(reader, params.clone()), params)
}
