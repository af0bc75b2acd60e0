use crate::calls::GAP_STR;
use crate::errors::{AppError, Result};
use crate::position::ConsensusPosition;
use std::borrow::Cow;

/// Contiguous run of consensus positions over one contig.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusSequence {
    contig: String,
    start: u64,
    stop: u64,
    positions: Vec<ConsensusPosition>,
    total_count: u64,
    ambiguous: Vec<usize>,
}

impl ConsensusSequence {
    pub fn new(contig: impl Into<String>) -> Self {
        Self {
            contig: contig.into(),
            start: 0,
            stop: 0,
            positions: Vec::new(),
            total_count: 0,
            ambiguous: Vec::new(),
        }
    }

    /// Appends a position; its coordinate must be exactly `stop + 1`.
    pub fn push(&mut self, position: ConsensusPosition) -> Result<()> {
        let coordinate = position.coordinate();
        if self.positions.is_empty() {
            self.start = coordinate;
        } else if coordinate != self.stop + 1 {
            return Err(AppError::NonContiguousAppend {
                contig: self.contig.clone(),
                expected: self.stop + 1,
                found: coordinate,
            });
        }

        if position.is_ambiguous() {
            self.ambiguous.push(self.positions.len());
        }
        self.stop = coordinate;
        self.total_count += u64::from(position.depth());
        self.positions.push(position);
        Ok(())
    }

    pub fn contig(&self) -> &str {
        &self.contig
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn stop(&self) -> u64 {
        self.stop
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[ConsensusPosition] {
        &self.positions
    }

    pub fn ambiguous_positions(&self) -> impl Iterator<Item = &ConsensusPosition> + '_ {
        self.ambiguous.iter().map(|index| &self.positions[*index])
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Mean read depth per position.
    pub fn coverage(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.total_count as f64 / (self.stop - self.start + 1) as f64
    }

    pub fn complexity(&self) -> usize {
        self.positions.iter().map(ConsensusPosition::complexity).sum()
    }

    /// Symbols over the inclusive range `[start, stop]`, one per position.
    pub fn get_fragment(&self, start: u64, stop: u64) -> Result<Fragment<'_>> {
        if self.is_empty() || start > stop || start < self.start || stop > self.stop {
            return Err(AppError::FragmentOutOfRange {
                start,
                stop,
                seq_start: self.start,
                seq_stop: self.stop,
            });
        }
        let first = (start - self.start) as usize;
        let last = (stop - self.start) as usize;
        Ok(Fragment {
            positions: self.positions[first..=last].iter(),
        })
    }

    /// Symbols over the whole sequence.
    pub fn fragment(&self) -> Fragment<'_> {
        Fragment {
            positions: self.positions.iter(),
        }
    }

    /// Concatenated fragment; gap positions are dropped unless `keep_gaps`.
    pub fn to_sequence_string(&self, keep_gaps: bool) -> String {
        let mut out = String::with_capacity(self.positions.len());
        for token in self.fragment() {
            if !keep_gaps && token == GAP_STR {
                continue;
            }
            out.push_str(&token);
        }
        out
    }

    /// Joins two non-overlapping runs of the same contig. Any hole between
    /// them is filled with zero-support gaps.
    pub fn merge(first: Self, second: Self) -> Result<Self> {
        if first.contig != second.contig {
            return Err(AppError::MergeConflict {
                reason: format!("contig mismatch: {} vs {}", first.contig, second.contig),
            });
        }
        if first.is_empty() {
            return Ok(second);
        }
        if second.is_empty() {
            return Ok(first);
        }
        let (mut head, tail) = if first.start <= second.start {
            (first, second)
        } else {
            (second, first)
        };
        if tail.start <= head.stop {
            return Err(AppError::MergeConflict {
                reason: format!(
                    "{}:{}-{} overlaps {}-{}",
                    head.contig, head.start, head.stop, tail.start, tail.stop
                ),
            });
        }

        for coordinate in (head.stop + 1)..tail.start {
            head.push(ConsensusPosition::gap(coordinate, 'N'))?;
        }
        for position in tail.positions {
            head.push(position)?;
        }
        Ok(head)
    }
}

/// Restartable iterator over rendered consensus symbols.
#[derive(Debug, Clone)]
pub struct Fragment<'a> {
    positions: std::slice::Iter<'a, ConsensusPosition>,
}

impl<'a> Iterator for Fragment<'a> {
    type Item = Cow<'a, str>;

    fn next(&mut self) -> Option<Self::Item> {
        self.positions.next().map(ConsensusPosition::render)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.positions.size_hint()
    }
}

impl ExactSizeIterator for Fragment<'_> {}

#[cfg(test)]
mod tests {
    use super::ConsensusSequence;
    use crate::errors::AppError;
    use crate::position::ConsensusPosition;

    fn run(contig: &str, start: u64, bases: &str, support: u32) -> ConsensusSequence {
        let mut sequence = ConsensusSequence::new(contig);
        for (offset, base) in bases.chars().enumerate() {
            sequence
                .push(ConsensusPosition::resolved(
                    start + offset as u64,
                    base,
                    &base.to_string(),
                    support,
                ))
                .expect("expected contiguous push");
        }
        sequence
    }

    #[test]
    fn tracks_span_count_and_coverage() {
        let sequence = run("ctg", 5, "ACGT", 3);
        assert_eq!(sequence.start(), 5);
        assert_eq!(sequence.stop(), 8);
        assert_eq!(sequence.stop() - sequence.start() + 1, sequence.len() as u64);
        assert_eq!(sequence.total_count(), 12);
        assert_eq!(sequence.coverage(), 3.0);
        assert_eq!(sequence.complexity(), 0);
    }

    #[test]
    fn rejects_non_contiguous_push() {
        let mut sequence = run("ctg", 1, "AC", 1);
        let error = sequence
            .push(ConsensusPosition::resolved(4, 'G', "G", 1))
            .expect_err("expected contiguity failure");
        assert!(matches!(
            error,
            AppError::NonContiguousAppend {
                expected: 3,
                found: 4,
                ..
            }
        ));
    }

    #[test]
    fn fragment_is_sized_and_repeatable() {
        let mut sequence = run("ctg", 1, "ACG", 4);
        let mut ambiguous = ConsensusPosition::observed(
            4,
            'C',
            vec!["A".into(), "A".into(), "T".into(), "T".into()],
            4,
        );
        ambiguous.flatten(1.0 / 3.0);
        sequence.push(ambiguous).expect("expected push");
        sequence
            .push(ConsensusPosition::gap(5, 'A'))
            .expect("expected push");

        let fragment = sequence.get_fragment(2, 5).expect("expected valid range");
        assert_eq!(fragment.len(), 4);
        let first: Vec<String> = fragment.clone().map(|token| token.into_owned()).collect();
        let second: Vec<String> = fragment.map(|token| token.into_owned()).collect();
        assert_eq!(first, vec!["C", "G", "W", "-"]);
        assert_eq!(first, second);
        assert_eq!(sequence.to_sequence_string(false), "ACGW");
        assert_eq!(sequence.to_sequence_string(true), "ACGW-");
        assert_eq!(sequence.ambiguous_positions().count(), 1);
        assert_eq!(sequence.complexity(), 2);
    }

    #[test]
    fn fragment_range_is_validated() {
        let sequence = run("ctg", 10, "ACGT", 1);
        assert!(sequence.get_fragment(9, 11).is_err());
        assert!(sequence.get_fragment(12, 11).is_err());
        assert!(sequence.get_fragment(10, 14).is_err());
        assert!(ConsensusSequence::new("empty").get_fragment(1, 1).is_err());
    }

    #[test]
    fn merge_fills_holes_with_gaps() {
        let tail = run("ctg", 7, "GG", 2);
        let head = run("ctg", 1, "AAA", 2);
        let merged = ConsensusSequence::merge(tail, head).expect("expected merge");
        assert_eq!(merged.start(), 1);
        assert_eq!(merged.stop(), 8);
        assert_eq!(merged.to_sequence_string(true), "AAA---GG");
        assert_eq!(merged.total_count(), 10);
        assert_eq!(merged.coverage(), 10.0 / 8.0);
    }

    #[test]
    fn merge_rejects_overlap_and_contig_mismatch() {
        assert!(ConsensusSequence::merge(run("a", 1, "AAA", 1), run("a", 3, "CC", 1)).is_err());
        assert!(ConsensusSequence::merge(run("a", 1, "A", 1), run("b", 5, "C", 1)).is_err());
    }
}
